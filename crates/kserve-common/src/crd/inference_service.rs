//! InferenceService CRD types
//!
//! An InferenceService declares a predictor and optional transformer and
//! explainer. Each component embeds a [`ComponentExtensionSpec`] controlling
//! replicas, autoscaling, request timeout and rollout strategy.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::InferenceServiceStatus;
use super::types::{ContainerSpec, EnvVar, ResourceRequirements};
use crate::config::DeploymentMode;
use crate::constants::{Component, DEPLOYMENT_MODE_ANNOTATION};
use crate::Error;

// =============================================================================
// CRD
// =============================================================================

/// Model serving deployment made of a predictor and optional transformer and explainer
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.kserve.io",
    version = "v1beta1",
    kind = "InferenceService",
    plural = "inferenceservices",
    shortname = "isvc",
    namespaced,
    status = "InferenceServiceStatus",
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceSpec {
    /// Model server component
    pub predictor: PredictorSpec,

    /// Pre/post-processing component placed in front of the predictor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<ComponentSpec>,

    /// Explanation component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explainer: Option<ComponentSpec>,
}

// =============================================================================
// Components
// =============================================================================

/// Settings shared by every component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentExtensionSpec {
    /// Minimum replicas; defaults to 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Maximum replicas; clamped to be at least minReplicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    /// Resource metric for annotation-free autoscaling (cpu, memory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_metric: Option<ScaleMetric>,

    /// Target type for `scaleMetric`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_metric_type: Option<MetricTargetType>,

    /// Target value for `scaleMetric`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_target: Option<i32>,

    /// Typed autoscaling metric sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaling: Option<AutoScalingSpec>,

    /// Request timeout in seconds applied on routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,

    /// Deployment rollout strategy override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_strategy: Option<DeploymentStrategy>,
}

/// A transformer or explainer: extension settings plus containers
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Replica, autoscaling and routing settings
    #[serde(flatten)]
    pub extension: ComponentExtensionSpec,

    /// Pod containers; the first is the serving container
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,

    /// Service account for the pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// The predictor: a component with an optional model and worker spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictorSpec {
    /// Containers and extension settings
    #[serde(flatten)]
    pub component: ComponentSpec,

    /// Model served by a ServingRuntime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSpec>,

    /// Multi-node tensor/pipeline-parallel worker configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_spec: Option<WorkerSpec>,
}

/// Model format and location
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    /// Model format used to select a runtime
    pub model_format: ModelFormat,

    /// Explicit ServingRuntime name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    /// Model location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,

    /// Extra model server arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra model server environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Model server resources
    #[serde(default, skip_serializing_if = "ResourceRequirements::is_empty")]
    pub resources: ResourceRequirements,
}

/// Model format name and optional version
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ModelFormat {
    /// Format name (e.g. sklearn, huggingface)
    pub name: String,
    /// Format version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Multi-node worker configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// GPUs per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensor_parallel_size: Option<i32>,

    /// Number of nodes (head included)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_parallel_size: Option<i32>,

    /// Worker containers; the runtime's worker container is used when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerSpec>,
}

/// Rollout strategy override
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStrategy {
    /// Strategy type (RollingUpdate, Recreate)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Rolling update parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdate>,
}

/// Rolling update parameters (int or percentage strings)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RollingUpdate {
    /// Max pods unavailable during the rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<String>,
    /// Max extra pods during the rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<String>,
}

// =============================================================================
// Autoscaling
// =============================================================================

/// Resource metric names
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMetric {
    /// CPU
    Cpu,
    /// Memory
    Memory,
}

impl ScaleMetric {
    /// Lowercase metric name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl std::str::FromStr for ScaleMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            other => Err(Error::config(
                crate::constants::AUTOSCALER_METRICS_ANNOTATION,
                format!("unsupported autoscaler metric '{other}'"),
            )),
        }
    }
}

/// Metric target types
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum MetricTargetType {
    /// Percentage of requested resource
    #[default]
    Utilization,
    /// Per-pod average
    AverageValue,
    /// Absolute value
    Value,
}

impl MetricTargetType {
    /// Name as used by HPA and KEDA
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utilization => "Utilization",
            Self::AverageValue => "AverageValue",
            Self::Value => "Value",
        }
    }
}

/// Typed autoscaling configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AutoScalingSpec {
    /// Metric sources; one trigger or metric per entry
    #[serde(default)]
    pub metrics: Vec<MetricsSpec>,
}

/// Kinds of metric sources
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum MetricSourceType {
    /// Container resource usage
    Resource,
    /// Query against an external metrics backend
    External,
    /// Per-pod metric collected by an OpenTelemetry sidecar
    PodMetric,
}

/// One autoscaling metric source
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSpec {
    /// Source kind
    #[serde(rename = "type")]
    pub type_: MetricSourceType,
    /// Set when type is Resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceMetricSource>,
    /// Set when type is External
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalMetricSource>,
    /// Set when type is PodMetric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub podmetric: Option<PodMetricSource>,
}

/// Target of a metric
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricTarget {
    /// Target type
    #[serde(rename = "type", default)]
    pub type_: MetricTargetType,
    /// Utilization percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_utilization: Option<i32>,
    /// Per-pod average quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_value: Option<String>,
    /// Absolute quantity or threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Resource metric source
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceMetricSource {
    /// Resource name
    pub name: ScaleMetric,
    /// Target
    #[serde(default)]
    pub target: MetricTarget,
}

/// External metric backends
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsBackend {
    /// Prometheus query
    #[default]
    Prometheus,
    /// OpenTelemetry collector
    Opentelemetry,
}

/// External metric source
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricSource {
    /// Query description
    pub metric: ExternalMetrics,
    /// Target
    #[serde(default)]
    pub target: MetricTarget,
    /// Authentication for the metrics backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ExtMetricAuthentication>,
}

/// External query description
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetrics {
    /// Backend
    #[serde(default)]
    pub backend: MetricsBackend,
    /// Backend address
    #[serde(default)]
    pub server_address: String,
    /// Query expression
    #[serde(default)]
    pub query: String,
    /// Tenant namespace for multi-tenant backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Authentication settings for an external metric backend
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtMetricAuthentication {
    /// Comma separated auth modes (basic, bearer, tls)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_modes: Option<String>,
    /// KEDA TriggerAuthentication reference
    pub authentication_ref: AuthenticationRef,
}

/// Reference to a KEDA TriggerAuthentication
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AuthenticationRef {
    /// TriggerAuthentication name
    pub name: String,
}

/// Pod metric source collected by an OpenTelemetry sidecar
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PodMetricSource {
    /// Metric description
    pub metric: PodMetrics,
    /// Target
    #[serde(default)]
    pub target: MetricTarget,
}

/// Pod metric description
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMetrics {
    /// Backend
    #[serde(default = "default_pod_metrics_backend")]
    pub backend: MetricsBackend,
    /// Scaler address override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    /// Metric query
    #[serde(default)]
    pub query: String,
    /// Aggregation over time (last_one, avg, max, min, rate, count)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_over_time: Option<String>,
    /// Metric names to keep in the collector pipeline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metric_names: Vec<String>,
}

fn default_pod_metrics_backend() -> MetricsBackend {
    MetricsBackend::Opentelemetry
}

// =============================================================================
// Accessors
// =============================================================================

impl InferenceServiceSpec {
    /// Extension settings of a component, if the component is present
    pub fn extension(&self, component: Component) -> Option<&ComponentExtensionSpec> {
        match component {
            Component::Predictor => Some(&self.predictor.component.extension),
            Component::Transformer => self.transformer.as_ref().map(|c| &c.extension),
            Component::Explainer => self.explainer.as_ref().map(|c| &c.extension),
        }
    }

    /// Whether the component is part of this InferenceService
    pub fn has_component(&self, component: Component) -> bool {
        self.extension(component).is_some()
    }

    /// Present components in reconcile order
    pub fn components(&self) -> Vec<Component> {
        Component::ALL
            .into_iter()
            .filter(|c| self.has_component(*c))
            .collect()
    }
}

impl ComponentExtensionSpec {
    /// Route timeout for the component
    pub fn timeout_seconds(&self, component: Component) -> i64 {
        self.timeout
            .unwrap_or_else(|| component.default_timeout_seconds())
    }
}

impl InferenceService {
    /// Deployment mode from the annotation, else the configured default
    pub fn deployment_mode(&self, default: DeploymentMode) -> Result<DeploymentMode, Error> {
        match self.annotations().get(DEPLOYMENT_MODE_ANNOTATION) {
            Some(mode) => mode.parse(),
            None => Ok(default),
        }
    }

    /// Namespace, required for a namespaced resource
    pub fn require_namespace(&self) -> Result<String, Error> {
        self.namespace().ok_or_else(|| {
            Error::validation_for(self.name_any(), "InferenceService is missing a namespace")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    fn parse(yaml: &str) -> InferenceServiceSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn crd_has_expected_names() {
        let crd = InferenceService::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("inferenceservices.serving.kserve.io")
        );
        assert_eq!(crd.spec.names.short_names, Some(vec!["isvc".to_string()]));
    }

    #[test]
    fn flattened_extension_fields_parse() {
        let spec = parse(
            r#"
predictor:
  minReplicas: 1
  maxReplicas: 3
  timeout: 30
  model:
    modelFormat:
      name: sklearn
    storageUri: gs://kfserving-examples/models/sklearn/1.0/model
transformer:
  containers:
    - image: kserve/image-transformer:latest
"#,
        );
        assert_eq!(spec.predictor.component.extension.min_replicas, Some(1));
        assert_eq!(spec.predictor.component.extension.max_replicas, Some(3));
        assert_eq!(
            spec.predictor.model.as_ref().unwrap().model_format.name,
            "sklearn"
        );
        assert_eq!(
            spec.components(),
            vec![Component::Predictor, Component::Transformer]
        );
        assert_eq!(
            spec.predictor
                .component
                .extension
                .timeout_seconds(Component::Predictor),
            30
        );
    }

    #[test]
    fn typed_metrics_parse() {
        let spec = parse(
            r#"
predictor:
  autoScaling:
    metrics:
      - type: Resource
        resource:
          name: memory
          target:
            type: AverageValue
            averageValue: 1Gi
      - type: External
        external:
          metric:
            backend: prometheus
            serverAddress: http://prometheus:9090
            query: http_requests_per_second
          target:
            type: Value
            value: "100"
      - type: PodMetric
        podmetric:
          metric:
            query: vllm:num_requests_running
            metricNames: ["vllm:num_requests_running"]
          target:
            type: Value
            value: "4"
"#,
        );
        let metrics = &spec
            .predictor
            .component
            .extension
            .auto_scaling
            .as_ref()
            .unwrap()
            .metrics;
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0].type_, MetricSourceType::Resource);
        assert_eq!(
            metrics[0].resource.as_ref().unwrap().target.type_,
            MetricTargetType::AverageValue
        );
        assert_eq!(
            metrics[2].podmetric.as_ref().unwrap().metric.backend,
            MetricsBackend::Opentelemetry
        );
    }

    #[test]
    fn default_timeouts_apply_when_unset() {
        let ext = ComponentExtensionSpec::default();
        assert_eq!(ext.timeout_seconds(Component::Explainer), 300);
    }

    #[test]
    fn deployment_mode_annotation_overrides_default() {
        let mut isvc = InferenceService::new("raw-foo", InferenceServiceSpec::default());
        assert_eq!(
            isvc.deployment_mode(DeploymentMode::RawDeployment).unwrap(),
            DeploymentMode::RawDeployment
        );
        isvc.annotations_mut().insert(
            DEPLOYMENT_MODE_ANNOTATION.to_string(),
            "Serverless".to_string(),
        );
        assert_eq!(
            isvc.deployment_mode(DeploymentMode::RawDeployment).unwrap(),
            DeploymentMode::Serverless
        );
    }
}
