//! Error types for the KServe RawDeployment controller
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the InferenceService or ConfigMap key it concerns
//! so that status conditions and events can point at the offending input.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Requeue delay used while a dependency (runtime, storage URI) is missing
pub const DEPENDENCY_REQUEUE: Duration = Duration::from_secs(10);

/// Main error type for controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for an InferenceService spec
    #[error("validation error for {isvc}: {message}")]
    Validation {
        /// Name of the InferenceService with invalid configuration
        isvc: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.predictor.workerSpec")
        field: Option<String>,
    },

    /// Controller configuration error (ConfigMap contents, annotations, templates)
    #[error("configuration error [{key}]: {message}")]
    Config {
        /// ConfigMap key or annotation that holds the bad value
        key: String,
        /// Description of what's invalid
        message: String,
    },

    /// A dependency of the InferenceService is not available yet
    #[error("dependency not ready for {isvc}: {message}")]
    DependencyNotReady {
        /// Name of the InferenceService waiting on the dependency
        isvc: String,
        /// What is missing (e.g., "no runtime found to support format sklearn")
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "status")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without InferenceService context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            isvc: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with InferenceService context
    pub fn validation_for(isvc: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            isvc: isvc.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with InferenceService context and field path
    pub fn validation_for_field(
        isvc: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            isvc: isvc.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a configuration error for a ConfigMap key or annotation
    pub fn config(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a dependency-not-ready error
    pub fn dependency_not_ready(isvc: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::DependencyNotReady {
            isvc: isvc.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, configuration and serialization errors need an input fix.
    /// Missing dependencies and internal errors are retried.
    /// Kubernetes errors depend on the status code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Don't retry on 4xx errors (validation, not found, etc.)
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Validation { .. } => false,
            Error::Config { .. } => false,
            Error::DependencyNotReady { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Requeue delay for errors that carry their own schedule
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Error::DependencyNotReady { .. } => Some(DEPENDENCY_REQUEUE),
            _ => None,
        }
    }

    /// Short machine-readable reason used on status conditions and events
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "KubernetesError",
            Error::Validation { .. } => "ValidationFailed",
            Error::Config { .. } => "ConfigInvalid",
            Error::DependencyNotReady { .. } => "DependencyNotReady",
            Error::Serialization { .. } => "SerializationFailed",
            Error::Internal { .. } => "InternalError",
        }
    }

    /// Get the InferenceService name if this error is associated with one
    pub fn isvc(&self) -> Option<&str> {
        match self {
            Error::Validation { isvc, .. } => Some(isvc),
            Error::DependencyNotReady { isvc, .. } => Some(isvc),
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Config { key, .. } => Some(key),
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
