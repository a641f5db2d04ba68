//! Well-known names, annotation keys, labels and defaults
//!
//! Child object names are deterministic so that every reconcile addresses the
//! same objects: `{isvc}-{component}` for Deployments, Services, autoscalers
//! and component routes, `{isvc}` for the top-level route.

use std::fmt;

use serde::{Deserialize, Serialize};

/// API group of the InferenceService CRD
pub const KSERVE_API_GROUP: &str = "serving.kserve.io";

// =============================================================================
// Annotations
// =============================================================================

/// Deployment mode annotation (`RawDeployment`, `Serverless`, `ModelMesh`)
pub const DEPLOYMENT_MODE_ANNOTATION: &str = "serving.kserve.io/deploymentMode";
/// Autoscaler class annotation (`hpa`, `keda`, `external`, `none`)
pub const AUTOSCALER_CLASS_ANNOTATION: &str = "serving.kserve.io/autoscalerClass";
/// Autoscaler metric annotation (`cpu`, `memory`)
pub const AUTOSCALER_METRICS_ANNOTATION: &str = "serving.kserve.io/metrics";
/// Autoscaler target annotation (utilization percentage)
pub const TARGET_UTILIZATION_ANNOTATION: &str = "serving.kserve.io/targetUtilizationPercentage";
/// Records the MinReplicas value last used to seed a Deployment replica count
pub const SEEDED_MIN_REPLICAS_ANNOTATION: &str = "serving.kserve.io/seeded-min-replicas";
/// Storage URI propagated to the pod template for the storage initializer
pub const STORAGE_URI_ANNOTATION: &str = "internal.serving.kserve.io/storage-initializer-sourceuri";
/// Pod annotation requesting injection of an OpenTelemetry collector sidecar
pub const OTEL_SIDECAR_INJECT_ANNOTATION: &str = "sidecar.opentelemetry.io/inject";
/// Deployment annotation carrying the rollout revision
pub const DEPLOYMENT_REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// Annotations never copied from the InferenceService onto generated objects
pub const ANNOTATION_DISALLOWED_LIST: &[&str] = &[
    "autoscaling.knative.dev/min-scale",
    "autoscaling.knative.dev/max-scale",
    STORAGE_URI_ANNOTATION,
    "kubectl.kubernetes.io/last-applied-configuration",
];

// =============================================================================
// Labels
// =============================================================================

/// Label linking a child object to its InferenceService
pub const ISVC_LABEL: &str = "serving.kserve.io/inferenceservice";
/// Label naming the component a child object belongs to
pub const COMPONENT_LABEL: &str = "component";
/// Pod selector label, valued `isvc.{component-name}`
pub const APP_LABEL: &str = "app";
/// Label marking the multi-node head Service of a given generation
pub const HEAD_SVC_GENERATION_LABEL: &str = "serving.kserve.io/head-svc-generation";
/// Visibility label; `cluster-local` suppresses external routes
pub const NETWORK_VISIBILITY_LABEL: &str = "networking.kserve.io/visibility";
/// Value of [`NETWORK_VISIBILITY_LABEL`] that keeps a service internal
pub const CLUSTER_LOCAL_VISIBILITY: &str = "cluster-local";

// =============================================================================
// Networking
// =============================================================================

/// Cluster-local DNS domain
pub const CLUSTER_LOCAL_DOMAIN: &str = "svc.cluster.local";
/// Port exposed by component Services
pub const SERVICE_PORT: i32 = 80;
/// Container port used when the container declares none
pub const DEFAULT_CONTAINER_PORT: i32 = 8080;
/// Header carrying the InferenceService name
pub const ISVC_NAME_HEADER: &str = "KServe-Isvc-Name";
/// Header carrying the InferenceService namespace
pub const ISVC_NAMESPACE_HEADER: &str = "KServe-Isvc-Namespace";
/// Host header name used in regex header matches
pub const HOST_HEADER: &str = "Host";

/// Path regex matching every request
pub const FALLBACK_PREFIX: &str = "^/.*$";
/// Path regex matching explain requests on the top-level host
pub const EXPLAIN_PREFIX: &str = r"^/v1/models/[\w-]+:explain$";
/// Path regex suffix matching explain requests under a path template
pub const PATH_BASED_EXPLAIN_PREFIX: &str = r"(/v1/models/[\w-]+:explain)$";

// =============================================================================
// Workloads
// =============================================================================

/// Name of the main model server container
pub const MAIN_CONTAINER_NAME: &str = "kserve-container";
/// Name of the worker container in multi-node deployments
pub const WORKER_CONTAINER_NAME: &str = "worker-container";
/// Default GPU resource name
pub const NVIDIA_GPU_RESOURCE: &str = "nvidia.com/gpu";
/// GPU resource names recognized when already present on a container
pub const GPU_RESOURCE_TYPES: &[&str] = &[
    NVIDIA_GPU_RESOURCE,
    "amd.com/gpu",
    "intel.com/gpu",
    "habana.ai/gaudi",
];
/// Env var carrying the pipeline-parallel size
pub const PIPELINE_PARALLEL_SIZE_ENV: &str = "PIPELINE_PARALLEL_SIZE";
/// Env var carrying the tensor-parallel size
pub const TENSOR_PARALLEL_SIZE_ENV: &str = "TENSOR_PARALLEL_SIZE";
/// Env var carrying the model storage URI
pub const STORAGE_URI_ENV: &str = "STORAGE_URI";

/// Default min replica count
pub const DEFAULT_MIN_REPLICAS: i32 = 1;
/// Default CPU utilization target in percent
pub const DEFAULT_CPU_UTILIZATION: i32 = 80;

// =============================================================================
// Components
// =============================================================================

/// One of the three InferenceService components
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Model server
    Predictor,
    /// Pre/post-processing in front of the predictor
    Transformer,
    /// Explanation server
    Explainer,
}

impl Component {
    /// All components in reconcile order
    pub const ALL: [Component; 3] = [
        Component::Predictor,
        Component::Transformer,
        Component::Explainer,
    ];

    /// Lowercase component name used in object names and labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Predictor => "predictor",
            Self::Transformer => "transformer",
            Self::Explainer => "explainer",
        }
    }

    /// Readiness condition type for this component
    pub fn ready_condition(&self) -> &'static str {
        match self {
            Self::Predictor => crate::crd::PREDICTOR_READY,
            Self::Transformer => crate::crd::TRANSFORMER_READY,
            Self::Explainer => crate::crd::EXPLAINER_READY,
        }
    }

    /// Request timeout applied on routes when the spec sets none
    pub fn default_timeout_seconds(&self) -> i64 {
        match self {
            Self::Predictor => 60,
            Self::Transformer => 120,
            Self::Explainer => 300,
        }
    }

    /// Name shared by the component's Deployment, Service and autoscaler
    pub fn object_name(&self, isvc: &str) -> String {
        format!("{}-{}", isvc, self.as_str())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker Deployment name for a multi-node predictor
pub fn worker_name(isvc: &str) -> String {
    format!("{}-worker", Component::Predictor.object_name(isvc))
}

/// Headless head Service name for a given generation
pub fn head_service_name(isvc: &str, generation: i64) -> String {
    format!(
        "{}-head-{}",
        Component::Predictor.object_name(isvc),
        generation
    )
}

/// Value of the `app` selector label for a component object name
pub fn app_label_value(object_name: &str) -> String {
    format!("isvc.{}", object_name)
}

/// Cluster-local hostname of a Service
pub fn service_hostname(name: &str, namespace: &str) -> String {
    format!("{}.{}.{}", name, namespace, CLUSTER_LOCAL_DOMAIN)
}

/// Regular expression matching `host` with an optional port
pub fn host_regexp(host: &str) -> String {
    format!("^{}(?::\\d{{1,5}})?$", quote_meta(host))
}

/// Escape regex metacharacters the way RE2 `QuoteMeta` does
fn quote_meta(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        if r"\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// True when the annotation may be propagated to generated objects
pub fn annotation_allowed(key: &str) -> bool {
    !ANNOTATION_DISALLOWED_LIST.contains(&key)
}
