//! Common types for the KServe RawDeployment controller: CRDs, configuration,
//! errors, and utilities

#![deny(missing_docs)]

pub mod config;
pub mod constants;
pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod metrics;
pub mod telemetry;
pub mod template;

pub use error::Error;
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every server-side apply issued by the controller
pub const FIELD_MANAGER: &str = "kserve-controller";

/// Namespace the controller runs in when `POD_NAMESPACE` is not set
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "kserve";

/// Label key marking objects managed by this controller
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value for objects managed by this controller
pub const LABEL_MANAGED_BY_KSERVE: &str = "kserve-controller";

/// Resolve the namespace holding the controller's ConfigMap
pub fn system_namespace() -> String {
    std::env::var("POD_NAMESPACE").unwrap_or_else(|_| DEFAULT_SYSTEM_NAMESPACE.to_string())
}
