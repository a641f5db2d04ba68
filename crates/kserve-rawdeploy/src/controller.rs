//! InferenceService controller implementation
//!
//! One reconcile pass loads the controller configuration, resolves the
//! predictor's runtime, converges every component's children, emits routes
//! once the components are ready and publishes the aggregated status. Child
//! objects are applied only when they differ from the live objects, so a pass
//! over an unchanged InferenceService issues no writes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use kserve_common::config::{
    DeploymentMode, InferenceServicesConfig, CONFIG_MAP_NAME, INGRESS_CONFIG_KEY,
};
use kserve_common::constants::{annotation_allowed, Component};
use kserve_common::crd::{
    ComponentSpec, Condition, ConditionStatus, InferenceService, InferenceServiceSpec,
    InferenceServiceStatus, ServingRuntime, READY,
};
use kserve_common::events::{actions, reasons, EventPublisher};
use kserve_common::kube_utils::{controller_owner_ref, find_discovered_resource, HasApiResource};
use kserve_common::metrics::ReconcileTimer;
use kserve_common::template::TemplateEngine;
use kserve_common::{Error, KubeEventPublisher, FIELD_MANAGER};
#[cfg(test)]
use kserve_common::NoopEventPublisher;

use crate::autoscaler::AutoscalerKind;
use crate::component::{apply_child, ComponentReconciler, ComponentRequest, WorkerSource};
use crate::ingress::{
    entry_component, is_cluster_local, route_readiness, RouteHosts, RouteInput, RoutePlan,
    RouteSynthesizer,
};
use crate::k8s::{HorizontalPodAutoscaler, HttpRoute, Ingress, OpenTelemetryCollector, ScaledObject};
use crate::runtime::{resolve_predictor, ResolvedPredictor};
use crate::status::{
    ComponentObservation, ComponentState, IngressObservation, StatusAggregator, StatusInput,
};

/// Requeue interval once the InferenceService is ready
const READY_REQUEUE: Duration = Duration::from_secs(300);

/// Requeue interval while components or routes are still converging
const PROGRESSING_REQUEUE: Duration = Duration::from_secs(30);

/// IngressReady reason while route hosts cannot be rendered
const ROUTE_HOSTS_UNRESOLVED: &str = "RouteHostsUnresolved";

/// Requeue interval after a retryable failure
const RETRY_REQUEUE: Duration = Duration::from_secs(30);

// =============================================================================
// Discovered CRD versions
// =============================================================================

/// API versions of the optional third-party CRDs the controller writes.
///
/// Resolved once at startup. A `None` field means the CRD is not installed;
/// InferenceServices that need it fail with a configuration error.
#[derive(Clone, Debug)]
pub struct DiscoveredCrds {
    /// Gateway API HTTPRoute
    pub http_route: Option<ApiResource>,
    /// KEDA ScaledObject
    pub scaled_object: Option<ApiResource>,
    /// OpenTelemetry operator collector
    pub otel_collector: Option<ApiResource>,
}

impl DiscoveredCrds {
    /// Discover installed CRD versions from the API server
    pub async fn discover(client: &Client) -> Self {
        use kube::discovery::Discovery;

        let discovery = match Discovery::new(client.clone()).run().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "API discovery failed, falling back to hardcoded CRD versions");
                return Self::hardcoded_defaults();
            }
        };

        Self {
            http_route: find_discovered_resource(&discovery, "gateway.networking.k8s.io", "HTTPRoute"),
            scaled_object: find_discovered_resource(&discovery, "keda.sh", "ScaledObject"),
            otel_collector: find_discovered_resource(
                &discovery,
                "opentelemetry.io",
                "OpenTelemetryCollector",
            ),
        }
    }

    /// Versions the generated objects are written against
    pub fn hardcoded_defaults() -> Self {
        Self {
            http_route: Some(HttpRoute::api_resource()),
            scaled_object: Some(ScaledObject::api_resource()),
            otel_collector: Some(OpenTelemetryCollector::api_resource()),
        }
    }

    /// ApiResource for an autoscaler kind, if served by the cluster
    pub fn autoscaler_resource(&self, kind: AutoscalerKind) -> Option<ApiResource> {
        match kind {
            AutoscalerKind::Hpa => Some(HorizontalPodAutoscaler::api_resource()),
            AutoscalerKind::ScaledObject => self.scaled_object.clone(),
            AutoscalerKind::OtelCollector => self.otel_collector.clone(),
        }
    }
}

// =============================================================================
// Kubernetes client
// =============================================================================

/// Kubernetes operations used by the reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IsvcKubeClient: Send + Sync {
    /// Data of the controller ConfigMap, `None` if it does not exist
    async fn get_config(&self, namespace: &str)
        -> Result<Option<BTreeMap<String, String>>, Error>;

    /// Live object as JSON, `None` if it does not exist
    async fn get_json(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, Error>;

    /// Server-side apply an object, returning the object after the apply
    async fn apply_json(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
        body: Value,
    ) -> Result<Value, Error>;

    /// Delete an object; a missing object is not an error
    async fn delete(&self, ar: &ApiResource, namespace: &str, name: &str) -> Result<(), Error>;

    /// Names of the objects matching a label selector
    async fn list_names(
        &self,
        ar: &ApiResource,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, Error>;

    /// A ServingRuntime by name
    async fn get_serving_runtime(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServingRuntime>, Error>;

    /// Every ServingRuntime in a namespace
    async fn list_serving_runtimes(&self, namespace: &str) -> Result<Vec<ServingRuntime>, Error>;

    /// Replace the InferenceService status
    async fn patch_isvc_status(
        &self,
        namespace: &str,
        name: &str,
        status: &InferenceServiceStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct IsvcKubeClientImpl {
    client: Client,
}

impl IsvcKubeClientImpl {
    /// Create a new IsvcKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic(&self, ar: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, ar)
    }
}

#[async_trait]
impl IsvcKubeClient for IsvcKubeClientImpl {
    async fn get_config(
        &self,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.get(CONFIG_MAP_NAME).await {
            Ok(cm) => Ok(Some(cm.data.unwrap_or_default())),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_json(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, Error> {
        match self.dynamic(ar, namespace).get(name).await {
            Ok(obj) => Ok(Some(serde_json::to_value(obj)?)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_json(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
        body: Value,
    ) -> Result<Value, Error> {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let applied = self
            .dynamic(ar, namespace)
            .patch(name, &params, &Patch::Apply(&body))
            .await?;
        Ok(serde_json::to_value(applied)?)
    }

    async fn delete(&self, ar: &ApiResource, namespace: &str, name: &str) -> Result<(), Error> {
        match self
            .dynamic(ar, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_names(
        &self,
        ar: &ApiResource,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, Error> {
        let list = self
            .dynamic(ar, namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items.iter().map(|o| o.name_any()).collect())
    }

    async fn get_serving_runtime(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServingRuntime>, Error> {
        let api: Api<ServingRuntime> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(runtime) => Ok(Some(runtime)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_serving_runtimes(&self, namespace: &str) -> Result<Vec<ServingRuntime>, Error> {
        let api: Api<ServingRuntime> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_isvc_status(
        &self,
        namespace: &str,
        name: &str,
        status: &InferenceServiceStatus,
    ) -> Result<(), Error> {
        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared state for the InferenceService controller
pub struct Context {
    /// Kubernetes client for API operations
    pub kube: Arc<dyn IsvcKubeClient>,
    /// Event publisher for emitting Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Discovered optional CRD versions
    pub crds: Arc<DiscoveredCrds>,
    /// Domain and path template renderer
    pub templates: TemplateEngine,
    /// Namespace holding the controller ConfigMap
    pub system_namespace: String,
}

impl Context {
    /// Create a new context
    pub fn new(
        kube: Arc<dyn IsvcKubeClient>,
        events: Arc<dyn EventPublisher>,
        crds: Arc<DiscoveredCrds>,
        system_namespace: impl Into<String>,
    ) -> Self {
        Self {
            kube,
            events,
            crds,
            templates: TemplateEngine::new(),
            system_namespace: system_namespace.into(),
        }
    }

    /// Create a context backed by a real cluster client
    pub fn from_client(client: Client, crds: Arc<DiscoveredCrds>) -> Self {
        let events = Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER));
        Self::new(
            Arc::new(IsvcKubeClientImpl::new(client)),
            events,
            crds,
            kserve_common::system_namespace(),
        )
    }

    /// Create a context for testing with a mock client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn IsvcKubeClient>) -> Self {
        Self::new(
            kube,
            Arc::new(NoopEventPublisher),
            Arc::new(DiscoveredCrds::hardcoded_defaults()),
            kserve_common::DEFAULT_SYSTEM_NAMESPACE,
        )
    }
}

// =============================================================================
// Reconcile
// =============================================================================

/// Reconcile a single InferenceService
#[instrument(skip(isvc, ctx), fields(isvc = %isvc.name_any()))]
pub async fn reconcile(isvc: Arc<InferenceService>, ctx: Arc<Context>) -> Result<Action, Error> {
    info!("reconciling inference service");
    let timer = ReconcileTimer::start();

    match reconcile_inner(&isvc, &ctx).await {
        Ok(action) => {
            timer.success();
            Ok(action)
        }
        Err(PassFailure { error, observed }) => {
            timer.error(error.reason());
            report_failure(&isvc, &ctx, observed, &error).await;
            Err(error)
        }
    }
}

/// A failed pass, with the status aggregated before the failure when the
/// pass got as far as the components
struct PassFailure {
    error: Error,
    observed: Option<InferenceServiceStatus>,
}

impl From<Error> for PassFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            observed: None,
        }
    }
}

async fn reconcile_inner(isvc: &InferenceService, ctx: &Context) -> Result<Action, PassFailure> {
    let name = isvc.name_any();
    let namespace = isvc.require_namespace()?;

    let data = ctx
        .kube
        .get_config(&ctx.system_namespace)
        .await?
        .ok_or_else(|| {
            Error::dependency_not_ready(
                &name,
                format!(
                    "ConfigMap {}/{CONFIG_MAP_NAME} not found",
                    ctx.system_namespace
                ),
            )
        })?;
    let config = InferenceServicesConfig::from_data(&data)?;

    let mode = isvc.deployment_mode(config.deploy.default_deployment_mode)?;
    if mode != DeploymentMode::RawDeployment {
        debug!(mode = %mode, "not a RawDeployment inference service, skipping");
        return Ok(Action::await_change());
    }

    let labels = isvc.labels().clone();
    let annotations: BTreeMap<String, String> = isvc
        .annotations()
        .iter()
        .filter(|(k, _)| annotation_allowed(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let owner = controller_owner_ref(isvc);
    let generation = isvc.metadata.generation.unwrap_or_default();
    let predictor = &isvc.spec.predictor;

    let resolved = resolve_predictor(ctx.kube.as_ref(), &name, &namespace, predictor).await?;

    let previous = isvc.status.clone().unwrap_or_default();
    let mut working = previous.clone();
    let reconciler = ComponentReconciler::new(ctx.kube.as_ref(), &ctx.crds);
    let mut observations = Vec::new();
    let mut first_error: Option<Error> = None;

    for component in isvc.spec.components() {
        let extension = isvc.spec.extension(component).ok_or_else(|| {
            Error::internal_with_context("reconciler", format!("{component} has no spec"))
        })?;

        let request = ComponentRequest {
            isvc_name: &name,
            namespace: &namespace,
            generation,
            component,
            extension,
            containers: Vec::new(),
            service_account_name: None,
            pod_annotations: BTreeMap::new(),
            worker: None,
            labels: &labels,
            annotations: &annotations,
            isvc_annotations: isvc.annotations(),
            otel: &config.opentelemetry_collector,
            owner: owner.clone(),
        };
        let observed = match component_request(isvc, &name, component, &resolved, request) {
            Ok(request) => reconciler.reconcile(request).await,
            Err(e) => Err(e),
        };
        let observed = observed.unwrap_or_else(|e| {
            warn!(%component, error = %e, "component reconciliation failed");
            let failed = failed_observation(&previous, component, &e);
            first_error.get_or_insert(e);
            failed
        });
        working.set_condition(observed.state.condition(component.ready_condition()));
        observations.push(observed);
    }

    let hosts = match RouteHosts::resolve(isvc, &namespace, &config.ingress, &ctx.templates) {
        Ok(hosts) => Some(hosts),
        Err(e) => {
            warn!(error = %e, "route host resolution failed");
            first_error.get_or_insert(e);
            None
        }
    };
    let ingress = match &hosts {
        Some(hosts) => {
            let route_input = RouteInput {
                isvc,
                isvc_name: &name,
                namespace: &namespace,
                config: &config.ingress,
                hosts,
                labels: &labels,
                annotations: &annotations,
                owner,
            };
            let routed = match RouteSynthesizer::plan(&route_input, &working) {
                Ok(plan) => apply_routes(ctx, &namespace, plan).await,
                Err(e) => Err(e),
            };
            routed.unwrap_or_else(|e| {
                warn!(error = %e, "route reconciliation failed");
                let observation = IngressObservation::NotReady {
                    reason: e.reason().to_string(),
                    message: e.to_string(),
                };
                first_error.get_or_insert(e);
                observation
            })
        }
        None => IngressObservation::NotReady {
            reason: ROUTE_HOSTS_UNRESOLVED.to_string(),
            message: "route hosts could not be resolved".to_string(),
        },
    };

    let status = StatusAggregator::aggregate(
        &previous,
        &StatusInput {
            isvc,
            isvc_name: &name,
            namespace: &namespace,
            hosts: hosts.as_ref(),
            url_scheme: &config.ingress.url_scheme,
            external: !is_cluster_local(isvc, &config.ingress),
            entry: entry_component(&isvc.spec),
            components: &observations,
            ingress,
        },
    );

    if let Some(error) = first_error {
        return Err(PassFailure {
            error,
            observed: Some(status),
        });
    }

    if status.same_state(&previous) {
        debug!("status unchanged");
    } else {
        ctx.kube
            .patch_isvc_status(&namespace, &name, &status)
            .await?;
        publish_transitions(isvc, ctx, &previous, &status).await;
    }

    let ready = status.is_condition_true(READY);
    info!(ready, "reconciled inference service");
    Ok(Action::requeue(if ready {
        READY_REQUEUE
    } else {
        PROGRESSING_REQUEUE
    }))
}

/// Fill in the component-specific parts of a request
fn component_request<'a>(
    isvc: &'a InferenceService,
    name: &str,
    component: Component,
    resolved: &'a ResolvedPredictor,
    request: ComponentRequest<'a>,
) -> Result<ComponentRequest<'a>, Error> {
    match component {
        Component::Predictor => {
            let predictor = &isvc.spec.predictor;
            Ok(ComponentRequest {
                containers: resolved.containers.clone(),
                service_account_name: predictor.component.service_account_name.clone(),
                pod_annotations: resolved.pod_annotations.clone(),
                worker: predictor.worker_spec.as_ref().map(|spec| WorkerSource {
                    spec,
                    runtime: resolved.runtime_worker.as_ref(),
                }),
                ..request
            })
        }
        Component::Transformer | Component::Explainer => {
            let spec = auxiliary_spec(&isvc.spec, component).ok_or_else(|| {
                Error::internal_with_context("reconciler", format!("{component} has no spec"))
            })?;
            if spec.containers.is_empty() {
                return Err(Error::validation_for_field(
                    name,
                    format!("spec.{component}.containers"),
                    format!("{component} must declare at least one container"),
                ));
            }
            Ok(ComponentRequest {
                containers: spec.containers.clone(),
                service_account_name: spec.service_account_name.clone(),
                ..request
            })
        }
    }
}

/// Observation standing in for a component whose reconciliation failed
fn failed_observation(
    previous: &InferenceServiceStatus,
    component: Component,
    error: &Error,
) -> ComponentObservation {
    ComponentObservation {
        component,
        state: ComponentState::Failed {
            reason: error.reason().to_string(),
            message: error.to_string(),
        },
        revision: previous
            .components
            .get(component.as_str())
            .and_then(|c| c.latest_created_revision.clone()),
    }
}

fn auxiliary_spec(spec: &InferenceServiceSpec, component: Component) -> Option<&ComponentSpec> {
    match component {
        Component::Predictor => None,
        Component::Transformer => spec.transformer.as_ref(),
        Component::Explainer => spec.explainer.as_ref(),
    }
}

/// Apply the planned routes and read back their readiness
async fn apply_routes(
    ctx: &Context,
    namespace: &str,
    plan: RoutePlan,
) -> Result<IngressObservation, Error> {
    match plan {
        RoutePlan::Skipped => Ok(IngressObservation::Ready),
        RoutePlan::Gated { reason, message } => {
            debug!(reason, "routes held back");
            Ok(IngressObservation::NotReady {
                reason: reason.to_string(),
                message,
            })
        }
        RoutePlan::HttpRoutes(routes) => {
            let ar = ctx.crds.http_route.clone().ok_or_else(|| {
                Error::config(
                    INGRESS_CONFIG_KEY,
                    "enableGatewayApi is set but the HTTPRoute CRD is not installed",
                )
            })?;
            let mut observation = IngressObservation::Ready;
            for route in &routes {
                let live =
                    apply_child(ctx.kube.as_ref(), &ar, namespace, &route.metadata.name, route)
                        .await?;
                if let (IngressObservation::Ready, Err((reason, message))) =
                    (&observation, route_readiness(&live))
                {
                    observation = IngressObservation::NotReady { reason, message };
                }
            }
            Ok(observation)
        }
        RoutePlan::Ingress(ingress) => {
            apply_child(
                ctx.kube.as_ref(),
                &Ingress::api_resource(),
                namespace,
                &ingress.metadata.name,
                &ingress,
            )
            .await?;
            Ok(IngressObservation::Ready)
        }
    }
}

/// Emit Normal events for conditions that just became ready
async fn publish_transitions(
    isvc: &InferenceService,
    ctx: &Context,
    previous: &InferenceServiceStatus,
    current: &InferenceServiceStatus,
) {
    let became_ready =
        |type_: &str| current.is_condition_true(type_) && !previous.is_condition_true(type_);

    for component in Component::ALL {
        if became_ready(component.ready_condition()) {
            ctx.events
                .publish(
                    &isvc.object_ref(&()),
                    EventType::Normal,
                    reasons::COMPONENT_READY,
                    actions::RECONCILE,
                    Some(format!("{component} is available")),
                )
                .await;
        }
    }
    if became_ready(READY) {
        ctx.events
            .publish(
                &isvc.object_ref(&()),
                EventType::Normal,
                reasons::INFERENCE_SERVICE_READY,
                actions::RECONCILE,
                current.url.clone(),
            )
            .await;
    }
}

/// Surface a failed pass on the Ready condition and as a Warning event.
///
/// `observed` carries the status aggregated before the failure; the failure
/// only overrides `Ready` on top of it. API errors before any component was
/// reached are left to the work queue; they say nothing about the spec.
async fn report_failure(
    isvc: &InferenceService,
    ctx: &Context,
    observed: Option<InferenceServiceStatus>,
    error: &Error,
) {
    let api_error = matches!(error, Error::Kube { .. });
    if api_error && observed.is_none() {
        return;
    }
    let Some(namespace) = isvc.namespace() else {
        return;
    };

    let previous = isvc.status.clone().unwrap_or_default();
    let mut status = observed.unwrap_or_else(|| previous.clone());
    let ready = if error.requeue_after().is_some() || api_error {
        ConditionStatus::Unknown
    } else {
        ConditionStatus::False
    };
    status.set_condition(Condition::new(READY, ready, error.reason(), error.to_string()));
    status.observed_generation = isvc.metadata.generation;

    if status.same_state(&previous) {
        return;
    }
    if let Err(e) = ctx
        .kube
        .patch_isvc_status(&namespace, &isvc.name_any(), &status)
        .await
    {
        warn!(error = %e, "failed to record failure status");
        return;
    }
    publish_transitions(isvc, ctx, &previous, &status).await;

    if api_error {
        return;
    }
    let reason = match error {
        Error::Validation { .. } => reasons::VALIDATION_FAILED,
        Error::Config { .. } => reasons::CONFIG_INVALID,
        _ => reasons::RECONCILE_FAILED,
    };
    ctx.events
        .publish(
            &isvc.object_ref(&()),
            EventType::Warning,
            reason,
            actions::RECONCILE,
            Some(error.to_string()),
        )
        .await;
}

/// Error policy for the controller
pub fn error_policy(isvc: Arc<InferenceService>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        isvc = %isvc.name_any(),
        retryable = error.is_retryable(),
        context = error.context().unwrap_or_default(),
        "reconciliation failed"
    );

    if let Some(delay) = error.requeue_after() {
        Action::requeue(delay)
    } else if error.is_retryable() {
        Action::requeue(RETRY_REQUEUE)
    } else {
        Action::await_change()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use kserve_common::constants::{
        AUTOSCALER_CLASS_ANNOTATION, DEPLOYMENT_MODE_ANNOTATION, PIPELINE_PARALLEL_SIZE_ENV,
    };
    use kserve_common::crd::{
        ComponentExtensionSpec, ContainerSpec, PredictorSpec, WorkerSpec, INGRESS_READY,
        PREDICTOR_READY, TRANSFORMER_READY,
    };

    type Store = Arc<Mutex<BTreeMap<String, Value>>>;
    type Captured = Arc<Mutex<Option<InferenceServiceStatus>>>;

    // =========================================================================
    // Test Fixtures
    // =========================================================================

    fn container(image: &str) -> ContainerSpec {
        ContainerSpec {
            image: image.to_string(),
            ..Default::default()
        }
    }

    fn sample_isvc(annotations: &[(&str, &str)]) -> InferenceService {
        let mut isvc = InferenceService::new(
            "raw-foo",
            InferenceServiceSpec {
                predictor: PredictorSpec {
                    component: ComponentSpec {
                        extension: ComponentExtensionSpec {
                            min_replicas: Some(1),
                            max_replicas: Some(3),
                            ..Default::default()
                        },
                        containers: vec![container("kserve/sklearnserver:latest")],
                        service_account_name: None,
                    },
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        isvc.metadata.namespace = Some("default".to_string());
        isvc.metadata.uid = Some("1f2e3d4c".to_string());
        isvc.metadata.generation = Some(1);
        isvc.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        isvc
    }

    fn with_transformer(mut isvc: InferenceService) -> InferenceService {
        isvc.spec.transformer = Some(ComponentSpec {
            containers: vec![container("kserve/image-transformer:latest")],
            ..Default::default()
        });
        isvc
    }

    fn key(ar: &ApiResource, name: &str) -> String {
        format!("{}/{}", ar.kind, name)
    }

    // =========================================================================
    // Mock Setup
    // =========================================================================

    /// Mock cluster: objects live in `store`, Deployments become Available
    /// on apply when `available` is set, status patches land in `captured`
    fn mock_cluster(store: &Store, captured: &Captured, available: bool) -> MockIsvcKubeClient {
        mock_cluster_with_config(store, captured, available, BTreeMap::new())
    }

    fn mock_cluster_with_config(
        store: &Store,
        captured: &Captured,
        available: bool,
        config: BTreeMap<String, String>,
    ) -> MockIsvcKubeClient {
        let mut mock = read_only_cluster_with_config(store, config);

        let writes = store.clone();
        mock.expect_apply_json().returning(move |ar, _, name, mut body| {
            if available && ar.kind == "Deployment" {
                body["status"] = json!({
                    "conditions": [{"type": "Available", "status": "True"}]
                });
            }
            writes.lock().unwrap().insert(key(ar, name), body.clone());
            Ok(body)
        });

        let captured = captured.clone();
        mock.expect_patch_isvc_status()
            .returning(move |_, _, status| {
                *captured.lock().unwrap() = Some(status.clone());
                Ok(())
            });
        mock
    }

    /// Reads served from `store`; writes need their own expectations
    fn read_only_cluster(store: &Store) -> MockIsvcKubeClient {
        read_only_cluster_with_config(store, BTreeMap::new())
    }

    fn read_only_cluster_with_config(
        store: &Store,
        config: BTreeMap<String, String>,
    ) -> MockIsvcKubeClient {
        let mut mock = MockIsvcKubeClient::new();
        mock.expect_get_config()
            .returning(move |_| Ok(Some(config.clone())));
        let reads = store.clone();
        mock.expect_get_json()
            .returning(move |ar, _, name| Ok(reads.lock().unwrap().get(&key(ar, name)).cloned()));
        let deletes = store.clone();
        mock.expect_delete().returning(move |ar, _, name| {
            deletes.lock().unwrap().remove(&key(ar, name));
            Ok(())
        });
        mock.expect_list_names().returning(|_, _, _| Ok(vec![]));
        mock
    }

    fn context(mock: MockIsvcKubeClient) -> Arc<Context> {
        Arc::new(Context::for_testing(Arc::new(mock)))
    }

    // =========================================================================
    // Reconciliation Story Tests
    // =========================================================================

    /// Story: a predictor that becomes available gets routes and a Ready status
    #[tokio::test]
    async fn story_available_predictor_becomes_ready() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let ctx = context(mock_cluster(&store, &captured, true));

        let action = reconcile(Arc::new(sample_isvc(&[])), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(READY_REQUEUE));

        let objects = store.lock().unwrap();
        assert!(objects.contains_key("Deployment/raw-foo-predictor"));
        assert!(objects.contains_key("Service/raw-foo-predictor"));
        assert!(objects.contains_key("HorizontalPodAutoscaler/raw-foo-predictor"));
        assert!(objects.contains_key("Ingress/raw-foo"));

        let status = captured.lock().unwrap().clone().unwrap();
        assert!(status.is_condition_true(READY));
        assert!(status.is_condition_true(PREDICTOR_READY));
        assert!(status.is_condition_true(INGRESS_READY));
        assert!(status.condition(TRANSFORMER_READY).is_none());
        assert_eq!(status.url.as_deref(), Some("http://raw-foo-default.example.com"));
        assert_eq!(status.observed_generation, Some(1));
    }

    /// Story: an unchanged InferenceService causes no writes on the second pass
    #[tokio::test]
    async fn story_second_pass_is_idempotent() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let isvc = with_transformer(sample_isvc(&[]));

        reconcile(
            Arc::new(isvc.clone()),
            context(mock_cluster(&store, &captured, true)),
        )
        .await
        .unwrap();

        let mut converged = isvc;
        converged.status = captured.lock().unwrap().clone();
        assert!(converged.status.is_some());

        let mut second = read_only_cluster(&store);
        second.expect_apply_json().never();
        second.expect_patch_isvc_status().never();

        let action = reconcile(Arc::new(converged), context(second))
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(READY_REQUEUE));
    }

    /// Story: routes wait for the Deployments to become available
    #[tokio::test]
    async fn story_progressing_predictor_gates_routes() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let ctx = context(mock_cluster(&store, &captured, false));

        let action = reconcile(Arc::new(sample_isvc(&[])), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(PROGRESSING_REQUEUE));
        assert!(!store.lock().unwrap().contains_key("Ingress/raw-foo"));

        let status = captured.lock().unwrap().clone().unwrap();
        let ingress = status.condition(INGRESS_READY).unwrap();
        assert_eq!(ingress.status, ConditionStatus::False);
        assert_eq!(ingress.reason, "PredictorIngressNotCreated");
        assert!(!status.is_condition_true(READY));
    }

    /// Story: switching the autoscaler class removes the old autoscaler
    #[tokio::test]
    async fn story_class_change_removes_previous_autoscaler() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();

        reconcile(
            Arc::new(sample_isvc(&[(AUTOSCALER_CLASS_ANNOTATION, "keda")])),
            context(mock_cluster(&store, &captured, true)),
        )
        .await
        .unwrap();
        assert!(store
            .lock()
            .unwrap()
            .contains_key("ScaledObject/raw-foo-predictor"));

        reconcile(
            Arc::new(sample_isvc(&[(AUTOSCALER_CLASS_ANNOTATION, "none")])),
            context(mock_cluster(&store, &captured, true)),
        )
        .await
        .unwrap();
        let objects = store.lock().unwrap();
        assert!(!objects.contains_key("ScaledObject/raw-foo-predictor"));
        assert!(!objects.contains_key("HorizontalPodAutoscaler/raw-foo-predictor"));
        assert_eq!(objects["Deployment/raw-foo-predictor"]["spec"]["replicas"], 1);
    }

    /// Story: a predictor with only a pipeline size gets two workers
    #[tokio::test]
    async fn story_pipeline_parallel_predictor_gets_workers() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let ctx = context(mock_cluster(&store, &captured, true));
        let mut isvc = sample_isvc(&[]);
        isvc.spec.predictor.worker_spec = Some(WorkerSpec {
            pipeline_parallel_size: Some(3),
            ..Default::default()
        });

        reconcile(Arc::new(isvc), ctx).await.unwrap();

        let objects = store.lock().unwrap();
        let worker = &objects["Deployment/raw-foo-predictor-worker"];
        assert_eq!(worker["spec"]["replicas"], 2);
        let env = worker["spec"]["template"]["spec"]["containers"][0]["env"]
            .as_array()
            .unwrap();
        assert!(env
            .iter()
            .any(|e| e["name"] == PIPELINE_PARALLEL_SIZE_ENV && e["value"] == "3"));
        assert!(objects.contains_key("Service/raw-foo-predictor-head-1"));

        let status = captured.lock().unwrap().clone().unwrap();
        assert!(status.is_condition_true(PREDICTOR_READY));
    }

    /// Story: a non-RawDeployment InferenceService is left alone
    #[tokio::test]
    async fn story_serverless_isvc_is_skipped() {
        let mut mock = MockIsvcKubeClient::new();
        mock.expect_get_config()
            .returning(|_| Ok(Some(BTreeMap::new())));
        mock.expect_apply_json().never();
        mock.expect_patch_isvc_status().never();

        let isvc = sample_isvc(&[(DEPLOYMENT_MODE_ANNOTATION, "Serverless")]);
        let action = reconcile(Arc::new(isvc), context(mock)).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    /// Story: an unknown autoscaler class is reported and waits for a change
    #[tokio::test]
    async fn story_unknown_autoscaler_class_fails_without_retry() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let ctx = context(mock_cluster(&store, &captured, true));
        let isvc = Arc::new(sample_isvc(&[(AUTOSCALER_CLASS_ANNOTATION, "vpa")]));

        let err = reconcile(isvc.clone(), ctx.clone()).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(error_policy(isvc, &err, ctx), Action::await_change());

        let status = captured.lock().unwrap().clone().unwrap();
        let ready = status.condition(READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "ConfigInvalid");
        assert!(store.lock().unwrap().is_empty());
    }

    /// Story: a missing controller ConfigMap requeues
    #[tokio::test]
    async fn story_missing_config_map_requeues() {
        let captured: Captured = Arc::default();
        let mut mock = MockIsvcKubeClient::new();
        mock.expect_get_config().returning(|_| Ok(None));
        let sink = captured.clone();
        mock.expect_patch_isvc_status()
            .times(1)
            .returning(move |_, _, status| {
                *sink.lock().unwrap() = Some(status.clone());
                Ok(())
            });
        let ctx = context(mock);
        let isvc = Arc::new(sample_isvc(&[]));

        let err = reconcile(isvc.clone(), ctx.clone()).await.unwrap_err();
        assert_eq!(
            error_policy(isvc, &err, ctx),
            Action::requeue(Duration::from_secs(10))
        );
        let status = captured.lock().unwrap().clone().unwrap();
        assert_eq!(status.condition(READY).unwrap().status, ConditionStatus::Unknown);
    }

    /// Story: Gateway API routing without the HTTPRoute CRD is a config error
    #[tokio::test]
    async fn story_gateway_api_requires_http_route_crd() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let mut config = BTreeMap::new();
        config.insert(
            INGRESS_CONFIG_KEY.to_string(),
            r#"{"enableGatewayApi": true, "kserveIngressGateway": "kserve/kserve-ingress-gateway"}"#
                .to_string(),
        );
        let mock = mock_cluster_with_config(&store, &captured, true, config);

        let crds = DiscoveredCrds {
            http_route: None,
            ..DiscoveredCrds::hardcoded_defaults()
        };
        let ctx = Arc::new(Context::new(
            Arc::new(mock),
            Arc::new(NoopEventPublisher),
            Arc::new(crds),
            "kserve",
        ));

        let err = reconcile(Arc::new(sample_isvc(&[])), ctx).await.unwrap_err();
        assert_eq!(err.reason(), "ConfigInvalid");
        assert!(store
            .lock()
            .unwrap()
            .contains_key("Deployment/raw-foo-predictor"));
    }

    /// Story: a transformer without containers fails the pass, but the
    /// predictor's observed state is still published
    #[tokio::test]
    async fn story_invalid_transformer_keeps_predictor_status() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let ctx = context(mock_cluster(&store, &captured, true));
        let mut isvc = sample_isvc(&[]);
        isvc.spec.transformer = Some(ComponentSpec::default());

        let err = reconcile(Arc::new(isvc), ctx).await.unwrap_err();
        assert_eq!(err.reason(), "ValidationFailed");
        {
            let objects = store.lock().unwrap();
            assert!(objects.contains_key("Deployment/raw-foo-predictor"));
            assert!(!objects.contains_key("Deployment/raw-foo-transformer"));
            assert!(!objects.contains_key("Ingress/raw-foo"));
        }

        let status = captured.lock().unwrap().clone().unwrap();
        assert!(status.is_condition_true(PREDICTOR_READY));
        assert!(status.components.contains_key("predictor"));
        let transformer = status.condition(TRANSFORMER_READY).unwrap();
        assert_eq!(transformer.status, ConditionStatus::False);
        assert_eq!(transformer.reason, "ValidationFailed");
        let ready = status.condition(READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "ValidationFailed");
        assert_eq!(status.observed_generation, Some(1));
    }

    /// Story: a route failure still publishes the component conditions
    #[tokio::test]
    async fn story_route_failure_keeps_component_status() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let mut config = BTreeMap::new();
        config.insert(
            INGRESS_CONFIG_KEY.to_string(),
            r#"{"enableGatewayApi": true, "kserveIngressGateway": "kserve/kserve-ingress-gateway"}"#
                .to_string(),
        );
        let crds = DiscoveredCrds {
            http_route: None,
            ..DiscoveredCrds::hardcoded_defaults()
        };
        let ctx = Arc::new(Context::new(
            Arc::new(mock_cluster_with_config(&store, &captured, true, config)),
            Arc::new(NoopEventPublisher),
            Arc::new(crds),
            "kserve",
        ));

        reconcile(Arc::new(sample_isvc(&[])), ctx).await.unwrap_err();

        let status = captured.lock().unwrap().clone().unwrap();
        assert!(status.is_condition_true(PREDICTOR_READY));
        let ingress = status.condition(INGRESS_READY).unwrap();
        assert_eq!(ingress.status, ConditionStatus::False);
        assert_eq!(ingress.reason, "ConfigInvalid");
        assert_eq!(status.condition(READY).unwrap().reason, "ConfigInvalid");
    }

    /// Story: with Gateway API each route's parent status drives IngressReady
    #[tokio::test]
    async fn story_unaccepted_http_route_keeps_ingress_not_ready() {
        let store: Store = Arc::default();
        let captured: Captured = Arc::default();
        let mut config = BTreeMap::new();
        config.insert(
            INGRESS_CONFIG_KEY.to_string(),
            r#"{"enableGatewayApi": true, "kserveIngressGateway": "kserve/kserve-ingress-gateway"}"#
                .to_string(),
        );
        let ctx = context(mock_cluster_with_config(&store, &captured, true, config));

        let action = reconcile(Arc::new(sample_isvc(&[])), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(PROGRESSING_REQUEUE));
        {
            let objects = store.lock().unwrap();
            assert!(objects.contains_key("HTTPRoute/raw-foo"));
            assert!(objects.contains_key("HTTPRoute/raw-foo-predictor"));
        }

        let status = captured.lock().unwrap().clone().unwrap();
        assert!(status.is_condition_true(PREDICTOR_READY));
        assert_eq!(
            status.condition(INGRESS_READY).unwrap().status,
            ConditionStatus::False
        );
    }

    #[test]
    fn hpa_is_always_resolvable() {
        let crds = DiscoveredCrds {
            http_route: None,
            scaled_object: None,
            otel_collector: None,
        };
        assert!(crds.autoscaler_resource(AutoscalerKind::Hpa).is_some());
        assert!(crds.autoscaler_resource(AutoscalerKind::ScaledObject).is_none());
    }
}
