//! Custom Resource Definitions for KServe
//!
//! `InferenceService` is owned by this controller; `ServingRuntime` is read
//! to resolve model servers.

mod inference_service;
mod serving_runtime;
mod status;
mod types;

pub use inference_service::{
    AuthenticationRef, AutoScalingSpec, ComponentExtensionSpec, ComponentSpec, DeploymentStrategy,
    ExtMetricAuthentication, ExternalMetricSource, ExternalMetrics, InferenceService,
    InferenceServiceSpec, MetricSourceType, MetricTarget, MetricTargetType, MetricsBackend,
    MetricsSpec, ModelFormat, ModelSpec, PodMetricSource, PodMetrics, PredictorSpec,
    ResourceMetricSource, RollingUpdate, ScaleMetric, WorkerSpec,
};
pub use serving_runtime::{
    RuntimeWorkerSpec, ServingRuntime, ServingRuntimeSpec, SupportedModelFormat,
};
pub use status::{
    Addressable, ComponentStatus, FailureInfo, InferenceServiceStatus, ModelRevisionStates,
    ModelState, ModelStatus, TransitionStatus, EXPLAINER_READY, INGRESS_READY, PREDICTOR_READY,
    READY, TRANSFORMER_READY,
};
pub use types::{
    Condition, ConditionStatus, ContainerPort, ContainerSpec, EnvVar, ResourceRequirements,
};
