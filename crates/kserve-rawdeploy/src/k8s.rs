//! Kubernetes resource types generated for an InferenceService
//!
//! Each child object is a plain serde struct carrying only the fields the
//! controller owns. Server-populated fields never appear here, which keeps the
//! serialized form a subset of the live object when nothing changed.

use std::collections::BTreeMap;

use kserve_common::crd::{ContainerPort, EnvVar, ResourceRequirements};
use kserve_common::kube_utils::{HasApiResource, ObjectMeta};
use serde::{Deserialize, Serialize};

// =============================================================================
// Macro for default serde functions
// =============================================================================

/// Implements `default_api_version()` / `default_kind()` from `HasApiResource`
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as HasApiResource>::KIND.to_string()
            }
        }
    };
}

// =============================================================================
// Deployment
// =============================================================================

/// Kubernetes Deployment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// API version
    #[serde(default = "Deployment::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Deployment::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: DeploymentSpec,
}

impl HasApiResource for Deployment {
    const API_VERSION: &'static str = "apps/v1";
    const KIND: &'static str = "Deployment";
}

impl_api_defaults!(Deployment);

impl Deployment {
    /// Create a new Deployment
    pub fn new(metadata: ObjectMeta, spec: DeploymentSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Deployment spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Replica count; omitted when an autoscaler owns it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Label selector
    pub selector: LabelSelector,
    /// Pod template
    pub template: PodTemplateSpec,
    /// Rollout strategy
    pub strategy: DeploymentStrategy,
    /// Old ReplicaSets to keep
    pub revision_history_limit: i32,
    /// Seconds before a stalled rollout is reported as failed
    pub progress_deadline_seconds: i32,
}

/// Deployment strategy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStrategy {
    /// RollingUpdate or Recreate
    #[serde(rename = "type")]
    pub type_: String,
    /// Rolling update parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdateConfig>,
}

/// Rolling update parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RollingUpdateConfig {
    /// Max pods unavailable
    pub max_unavailable: String,
    /// Max extra pods
    pub max_surge: String,
}

/// Label selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Match labels
    pub match_labels: BTreeMap<String, String>,
}

/// Pod template
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PodTemplateSpec {
    /// Pod metadata
    pub metadata: PodMeta,
    /// Pod spec
    pub spec: PodSpec,
}

/// Pod metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PodMeta {
    /// Labels
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Pod spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Containers; the first is the serving container
    pub containers: Vec<Container>,
    /// Service account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// Container
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Name
    pub name: String,
    /// Image
    pub image: String,
    /// Pull policy
    pub image_pull_policy: String,
    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    /// Resources
    #[serde(default, skip_serializing_if = "ResourceRequirements::is_empty")]
    pub resources: ResourceRequirements,
    /// Readiness probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    /// Termination message path
    pub termination_message_path: String,
    /// Termination message policy
    pub termination_message_policy: String,
}

/// Probe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// TCP check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_socket: Option<TcpSocketAction>,
    /// Seconds before the probe times out
    pub timeout_seconds: i32,
    /// Seconds between probes
    pub period_seconds: i32,
    /// Successes before ready
    pub success_threshold: i32,
    /// Failures before unready
    pub failure_threshold: i32,
}

/// TCP socket probe action
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TcpSocketAction {
    /// Port
    pub port: i32,
}

// =============================================================================
// Service
// =============================================================================

/// Kubernetes Service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// API version
    #[serde(default = "Service::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Service::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ServiceSpec,
}

impl HasApiResource for Service {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Service";
}

impl_api_defaults!(Service);

impl Service {
    /// Create a new Service
    pub fn new(metadata: ObjectMeta, spec: ServiceSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Service spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Service type
    #[serde(rename = "type")]
    pub type_: String,
    /// `None` for headless services
    #[serde(rename = "clusterIP", default, skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    /// Pod selector
    pub selector: BTreeMap<String, String>,
    /// Ports
    pub ports: Vec<ServicePort>,
    /// Publish endpoints before pods are ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_not_ready_addresses: Option<bool>,
}

/// Service port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port name
    pub name: String,
    /// Port number
    pub port: i32,
    /// Target container port
    pub target_port: i32,
    /// Protocol
    pub protocol: String,
}

// =============================================================================
// HorizontalPodAutoscaler
// =============================================================================

/// autoscaling/v2 HorizontalPodAutoscaler
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscaler {
    /// API version
    #[serde(default = "HorizontalPodAutoscaler::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "HorizontalPodAutoscaler::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: HpaSpec,
}

impl HasApiResource for HorizontalPodAutoscaler {
    const API_VERSION: &'static str = "autoscaling/v2";
    const KIND: &'static str = "HorizontalPodAutoscaler";
}

impl_api_defaults!(HorizontalPodAutoscaler);

impl HorizontalPodAutoscaler {
    /// Create a new HPA
    pub fn new(metadata: ObjectMeta, spec: HpaSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// HPA spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaSpec {
    /// Scaled object
    pub scale_target_ref: ScaleTargetRef,
    /// Lower replica bound
    pub min_replicas: i32,
    /// Upper replica bound
    pub max_replicas: i32,
    /// Metrics
    pub metrics: Vec<HpaMetric>,
    /// Scaling behavior
    pub behavior: HpaBehavior,
}

/// Reference to the scaled workload (shared by HPA and ScaledObject)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Name
    pub name: String,
}

impl ScaleTargetRef {
    /// Reference a Deployment by name
    pub fn deployment(name: impl Into<String>) -> Self {
        Self {
            api_version: Deployment::API_VERSION.to_string(),
            kind: Deployment::KIND.to_string(),
            name: name.into(),
        }
    }
}

/// HPA metric
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HpaMetric {
    /// Metric source type (Resource)
    #[serde(rename = "type")]
    pub type_: String,
    /// Resource metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<HpaResourceMetric>,
}

/// HPA resource metric
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HpaResourceMetric {
    /// Resource name (cpu, memory)
    pub name: String,
    /// Target
    pub target: HpaMetricTarget,
}

/// HPA metric target
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaMetricTarget {
    /// Utilization, AverageValue or Value
    #[serde(rename = "type")]
    pub type_: String,
    /// Percent of requested resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_utilization: Option<i32>,
    /// Per-pod quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_value: Option<String>,
    /// Total quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// HPA scaling behavior
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaBehavior {
    /// Scale-up rules
    pub scale_up: HpaScalingRules,
    /// Scale-down rules
    pub scale_down: HpaScalingRules,
}

/// HPA scaling rules for one direction
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaScalingRules {
    /// Stabilization window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stabilization_window_seconds: Option<i32>,
    /// Policy selection (Max, Min, Disabled)
    pub select_policy: String,
    /// Policies
    pub policies: Vec<HpaScalingPolicy>,
}

/// HPA scaling policy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaScalingPolicy {
    /// Pods or Percent
    #[serde(rename = "type")]
    pub type_: String,
    /// Amount
    pub value: i32,
    /// Period
    pub period_seconds: i32,
}

// =============================================================================
// KEDA ScaledObject
// =============================================================================

/// KEDA ScaledObject
///
/// KEDA manages its own HPA for the target, so a ScaledObject and an HPA for
/// the same Deployment never coexist.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObject {
    /// API version
    #[serde(default = "ScaledObject::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "ScaledObject::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ScaledObjectSpec,
}

impl HasApiResource for ScaledObject {
    const API_VERSION: &'static str = "keda.sh/v1alpha1";
    const KIND: &'static str = "ScaledObject";
}

impl_api_defaults!(ScaledObject);

impl ScaledObject {
    /// Create a new ScaledObject
    pub fn new(metadata: ObjectMeta, spec: ScaledObjectSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// ScaledObject spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectSpec {
    /// Scaled Deployment
    pub scale_target_ref: ScaleTargetRef,
    /// Lower replica bound
    pub min_replica_count: i32,
    /// Upper replica bound
    pub max_replica_count: i32,
    /// Triggers
    pub triggers: Vec<ScaledObjectTrigger>,
}

/// A KEDA trigger
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectTrigger {
    /// cpu, memory, prometheus or external
    #[serde(rename = "type")]
    pub type_: String,
    /// Metric type for resource triggers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
    /// Trigger metadata
    pub metadata: BTreeMap<String, String>,
    /// TriggerAuthentication reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_ref: Option<TriggerAuthenticationRef>,
}

/// Reference to a KEDA TriggerAuthentication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TriggerAuthenticationRef {
    /// Name
    pub name: String,
}

// =============================================================================
// OpenTelemetryCollector
// =============================================================================

/// OpenTelemetry operator collector, injected as a pod sidecar
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenTelemetryCollector {
    /// API version
    #[serde(default = "OpenTelemetryCollector::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "OpenTelemetryCollector::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: OtelCollectorSpec,
}

impl HasApiResource for OpenTelemetryCollector {
    const API_VERSION: &'static str = "opentelemetry.io/v1beta1";
    const KIND: &'static str = "OpenTelemetryCollector";
}

impl_api_defaults!(OpenTelemetryCollector);

impl OpenTelemetryCollector {
    /// Create a new collector
    pub fn new(metadata: ObjectMeta, spec: OtelCollectorSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Collector spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OtelCollectorSpec {
    /// Deployment mode (sidecar)
    pub mode: String,
    /// Collector pipeline configuration
    pub config: OtelConfig,
}

/// Collector pipeline configuration.
///
/// Component settings are free-form in the collector, so they stay JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Receivers by name
    pub receivers: BTreeMap<String, serde_json::Value>,
    /// Processors by name
    pub processors: BTreeMap<String, serde_json::Value>,
    /// Exporters by name
    pub exporters: BTreeMap<String, serde_json::Value>,
    /// Pipelines
    pub service: OtelService,
}

/// Collector service section
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OtelService {
    /// Pipelines by signal name
    pub pipelines: BTreeMap<String, OtelPipeline>,
}

/// One collector pipeline
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OtelPipeline {
    /// Receiver names
    pub receivers: Vec<String>,
    /// Processor names
    pub processors: Vec<String>,
    /// Exporter names
    pub exporters: Vec<String>,
}

// =============================================================================
// Gateway API HTTPRoute
// =============================================================================

/// Gateway API HTTPRoute
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "HttpRoute::default_api_version")]
    pub api_version: String,
    /// Kind (HTTPRoute)
    #[serde(default = "HttpRoute::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: HttpRouteSpec,
}

impl HasApiResource for HttpRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "HTTPRoute";
}

impl_api_defaults!(HttpRoute);

impl HttpRoute {
    /// Create a new HTTPRoute
    pub fn new(metadata: ObjectMeta, spec: HttpRouteSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// HTTPRoute spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Parent gateways
    pub parent_refs: Vec<ParentRef>,
    /// Hostnames
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Rules, evaluated in order
    pub rules: Vec<HttpRouteRule>,
}

/// Parent gateway reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParentRef {
    /// API group
    pub group: String,
    /// Kind
    pub kind: String,
    /// Gateway name
    pub name: String,
    /// Gateway namespace
    pub namespace: String,
    /// Listener port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl ParentRef {
    /// Reference a Gateway listener port
    pub fn gateway(namespace: &str, name: &str, port: i32) -> Self {
        Self {
            group: "gateway.networking.k8s.io".to_string(),
            kind: "Gateway".to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            port: Some(port),
        }
    }
}

/// HTTPRoute rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Matches; any one selects the rule
    pub matches: Vec<HttpRouteMatch>,
    /// Filters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<HttpRouteFilter>,
    /// Backends
    pub backend_refs: Vec<BackendRef>,
    /// Timeouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<HttpRouteTimeouts>,
}

/// HTTPRoute match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpRouteMatch {
    /// Path match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathMatch>,
    /// Header matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HttpHeaderMatch>,
}

/// Path match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpPathMatch {
    /// RegularExpression, PathPrefix or Exact
    #[serde(rename = "type")]
    pub type_: String,
    /// Value
    pub value: String,
}

/// Header match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpHeaderMatch {
    /// RegularExpression or Exact
    #[serde(rename = "type")]
    pub type_: String,
    /// Header name
    pub name: String,
    /// Value
    pub value: String,
}

/// Request filter
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteFilter {
    /// Filter type
    #[serde(rename = "type")]
    pub type_: String,
    /// Header modifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_header_modifier: Option<HttpHeaderFilter>,
}

/// Header modifications
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpHeaderFilter {
    /// Headers to set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<HttpHeader>,
}

/// A header name and value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpHeader {
    /// Name
    pub name: String,
    /// Value
    pub value: String,
}

/// Backend reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackendRef {
    /// API group (empty for core)
    pub group: String,
    /// Kind
    pub kind: String,
    /// Service name
    pub name: String,
    /// Service namespace
    pub namespace: String,
    /// Service port
    pub port: i32,
    /// Relative weight
    pub weight: i32,
}

impl BackendRef {
    /// Reference a Service port
    pub fn service(name: impl Into<String>, namespace: impl Into<String>, port: i32) -> Self {
        Self {
            group: String::new(),
            kind: "Service".to_string(),
            name: name.into(),
            namespace: namespace.into(),
            port,
            weight: 1,
        }
    }
}

/// Rule timeouts
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpRouteTimeouts {
    /// Request timeout (Gateway API duration, e.g. `60s`)
    pub request: String,
}

// =============================================================================
// networking.k8s.io Ingress
// =============================================================================

/// Classic Kubernetes Ingress
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    /// API version
    #[serde(default = "Ingress::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Ingress::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: IngressSpec,
}

impl HasApiResource for Ingress {
    const API_VERSION: &'static str = "networking.k8s.io/v1";
    const KIND: &'static str = "Ingress";
}

impl_api_defaults!(Ingress);

impl Ingress {
    /// Create a new Ingress
    pub fn new(metadata: ObjectMeta, spec: IngressSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Ingress spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// IngressClass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    /// Host rules
    pub rules: Vec<IngressRule>,
}

/// Ingress host rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressRule {
    /// Host
    pub host: String,
    /// HTTP paths
    pub http: HttpIngressRuleValue,
}

/// HTTP paths of a rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpIngressRuleValue {
    /// Paths
    pub paths: Vec<HttpIngressPath>,
}

/// One Ingress path
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressPath {
    /// Path
    pub path: String,
    /// Prefix or Exact
    pub path_type: String,
    /// Backend
    pub backend: IngressBackend,
}

/// Ingress backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressBackend {
    /// Service backend
    pub service: IngressServiceBackend,
}

/// Ingress Service backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressServiceBackend {
    /// Service name
    pub name: String,
    /// Service port
    pub port: ServiceBackendPort,
}

/// Ingress Service port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServiceBackendPort {
    /// Port number
    pub number: i32,
}
