//! Component reconciliation
//!
//! For one component: resolve the autoscaler plan, read the live Deployment
//! to carry the replica count forward, build the Deployment and Service (and
//! the worker objects of a multi-node predictor), apply whatever differs from
//! the live objects, remove autoscaler objects of kinds no longer selected,
//! and report the rollout state read back from the Deployments.

use std::collections::BTreeMap;

use kserve_common::config::OtelCollectorConfig;
use kserve_common::constants::{
    Component, AUTOSCALER_CLASS_ANNOTATION, COMPONENT_LABEL, DEFAULT_CONTAINER_PORT,
    DEFAULT_MIN_REPLICAS, HEAD_SVC_GENERATION_LABEL, ISVC_LABEL, MAIN_CONTAINER_NAME,
};
use kserve_common::crd::{ComponentExtensionSpec, ContainerSpec, RuntimeWorkerSpec, WorkerSpec};
use kserve_common::kube_utils::{json_subset, HasApiResource, OwnerReference};
use kserve_common::metrics::record_child_apply;
use kserve_common::Error;
use kube::discovery::ApiResource;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::autoscaler::{AutoscalerClass, AutoscalerInput, AutoscalerKind, AutoscalerPlan};
use crate::controller::{DiscoveredCrds, IsvcKubeClient};
use crate::k8s::{Deployment, HorizontalPodAutoscaler, Service};
use crate::multinode::{stale_head_services, MultiNodeExpander};
use crate::status::{deployment_revision, ComponentObservation, ComponentState};
use crate::workload::{
    resolve_replicas, serving_port, LiveReplicas, RolloutDefaults, WorkloadCompiler,
    WorkloadInput,
};

// =============================================================================
// Apply
// =============================================================================

/// Apply a child object unless the live object already matches it.
///
/// Returns the live object after the call, which is the applied object when
/// a write happened.
pub(crate) async fn apply_child<T: Serialize>(
    kube: &dyn IsvcKubeClient,
    ar: &ApiResource,
    namespace: &str,
    name: &str,
    object: &T,
) -> Result<Value, Error> {
    let desired = serde_json::to_value(object)
        .map_err(|e| Error::serialization_for_kind(ar.kind.clone(), e.to_string()))?;

    if let Some(live) = kube.get_json(ar, namespace, name).await? {
        if json_subset(&desired, &live) {
            debug!(kind = %ar.kind, name = %name, "child object unchanged");
            return Ok(live);
        }
    }

    debug!(kind = %ar.kind, name = %name, "applying child object");
    let applied = kube.apply_json(ar, namespace, name, desired).await?;
    record_child_apply(&ar.kind);
    Ok(applied)
}

/// Delete a child object if it exists
pub(crate) async fn delete_child(
    kube: &dyn IsvcKubeClient,
    ar: &ApiResource,
    namespace: &str,
    name: &str,
) -> Result<(), Error> {
    if kube.get_json(ar, namespace, name).await?.is_some() {
        info!(kind = %ar.kind, name = %name, "deleting stale child object");
        kube.delete(ar, namespace, name).await?;
    }
    Ok(())
}

// =============================================================================
// Request
// =============================================================================

/// Multi-node settings of a predictor
#[derive(Clone, Copy, Debug)]
pub struct WorkerSource<'a> {
    /// `workerSpec` of the predictor
    pub spec: &'a WorkerSpec,
    /// Worker defaults of the resolved runtime
    pub runtime: Option<&'a RuntimeWorkerSpec>,
}

/// Everything the component reconciler needs
#[derive(Clone, Debug)]
pub struct ComponentRequest<'a> {
    /// InferenceService name
    pub isvc_name: &'a str,
    /// Namespace
    pub namespace: &'a str,
    /// InferenceService generation
    pub generation: i64,
    /// Component
    pub component: Component,
    /// Replica, autoscaling and rollout settings
    pub extension: &'a ComponentExtensionSpec,
    /// Containers, main container first
    pub containers: Vec<ContainerSpec>,
    /// Pod service account
    pub service_account_name: Option<String>,
    /// Extra pod template annotations
    pub pod_annotations: BTreeMap<String, String>,
    /// Multi-node settings (predictor only)
    pub worker: Option<WorkerSource<'a>>,
    /// InferenceService labels
    pub labels: &'a BTreeMap<String, String>,
    /// Propagated InferenceService annotations
    pub annotations: &'a BTreeMap<String, String>,
    /// Unfiltered InferenceService annotations (autoscaler settings)
    pub isvc_annotations: &'a BTreeMap<String, String>,
    /// OpenTelemetry collector settings
    pub otel: &'a OtelCollectorConfig,
    /// Controller owner reference
    pub owner: Option<OwnerReference>,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Reconciles the child objects of one component
pub struct ComponentReconciler<'a> {
    kube: &'a dyn IsvcKubeClient,
    crds: &'a DiscoveredCrds,
}

impl<'a> ComponentReconciler<'a> {
    /// Create a reconciler
    pub fn new(kube: &'a dyn IsvcKubeClient, crds: &'a DiscoveredCrds) -> Self {
        Self { kube, crds }
    }

    /// Converge the component's children and report its state
    #[instrument(skip_all, fields(component = %req.component))]
    pub async fn reconcile(
        &self,
        req: ComponentRequest<'_>,
    ) -> Result<ComponentObservation, Error> {
        let name = req.component.object_name(req.isvc_name);
        let ns = req.namespace;

        let class = if req.worker.is_some() {
            debug!("multi-node predictor, autoscaling disabled");
            AutoscalerClass::None
        } else {
            AutoscalerClass::from_annotations(req.isvc_annotations)?
        };

        let mut child_labels = req.labels.clone();
        child_labels.insert(ISVC_LABEL.to_string(), req.isvc_name.to_string());
        child_labels.insert(
            COMPONENT_LABEL.to_string(),
            req.component.as_str().to_string(),
        );
        let metrics_port = req
            .containers
            .first()
            .map(serving_port)
            .unwrap_or(DEFAULT_CONTAINER_PORT);
        let plan = AutoscalerPlan::select(
            class,
            &AutoscalerInput {
                name: &name,
                namespace: ns,
                labels: &child_labels,
                annotations: req.annotations,
                isvc_annotations: req.isvc_annotations,
                extension: req.extension,
                metrics_port,
                otel: req.otel,
                owner: req.owner.clone(),
            },
        )?;
        debug!(class = %class, "selected autoscaler");

        let deployment_ar = Deployment::api_resource();
        let live = self.kube.get_json(&deployment_ar, ns, &name).await?;
        let min_replicas = req.extension.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS);
        let replicas = resolve_replicas(
            class.manages_replicas(),
            min_replicas,
            live.as_ref().map(LiveReplicas::from_json).as_ref(),
        );

        let mut pod_annotations = req.pod_annotations.clone();
        pod_annotations.extend(plan.pod_annotations());

        let mut input = WorkloadInput {
            name: name.clone(),
            namespace: ns,
            isvc_name: req.isvc_name,
            component: req.component,
            labels: req.labels.clone(),
            annotations: req.annotations.clone(),
            pod_annotations,
            containers: req.containers.clone(),
            main_container_name: MAIN_CONTAINER_NAME,
            service_account_name: req.service_account_name.clone(),
            replicas,
            min_replicas,
            strategy: req.extension.deployment_strategy.as_ref(),
            rollout: RolloutDefaults::Standard,
            owner: req.owner.clone(),
        };

        let multi_node = req.worker.map(|worker| {
            MultiNodeExpander::expand(&mut input, worker.spec, worker.runtime, req.generation)
        });

        let workloads = WorkloadCompiler::compile(&input);
        let head = apply_child(self.kube, &deployment_ar, ns, &name, &workloads.deployment).await?;
        apply_child(
            self.kube,
            &Service::api_resource(),
            ns,
            &name,
            &workloads.service,
        )
        .await?;

        let mut state = ComponentState::from_deployment(Some(&head));
        if req.component == Component::Predictor {
            let current_head = match &multi_node {
                Some(mn) => {
                    let worker = apply_child(
                        self.kube,
                        &deployment_ar,
                        ns,
                        &mn.worker.metadata.name,
                        &mn.worker,
                    )
                    .await?;
                    state = state.combine(ComponentState::from_deployment(Some(&worker)));
                    apply_child(
                        self.kube,
                        &Service::api_resource(),
                        ns,
                        &mn.head_service.metadata.name,
                        &mn.head_service,
                    )
                    .await?;
                    mn.head_service.metadata.name.clone()
                }
                None => String::new(),
            };
            self.remove_stale_head_services(req.isvc_name, ns, &current_head)
                .await?;
        }

        self.apply_autoscaler(&plan, ns, &name).await?;

        Ok(ComponentObservation {
            component: req.component,
            state,
            revision: deployment_revision(Some(&head)),
        })
    }

    async fn apply_autoscaler(
        &self,
        plan: &AutoscalerPlan,
        ns: &str,
        name: &str,
    ) -> Result<(), Error> {
        match plan {
            AutoscalerPlan::Hpa(hpa) => {
                apply_child(self.kube, &HorizontalPodAutoscaler::api_resource(), ns, name, hpa)
                    .await?;
            }
            AutoscalerPlan::Keda {
                scaled_object,
                collector,
            } => {
                let ar = self.required(AutoscalerKind::ScaledObject)?;
                apply_child(self.kube, &ar, ns, name, scaled_object).await?;
                if let Some(collector) = collector {
                    let ar = self.required(AutoscalerKind::OtelCollector)?;
                    apply_child(self.kube, &ar, ns, name, collector).await?;
                }
            }
            AutoscalerPlan::Unmanaged => {}
        }

        for kind in plan.stale_kinds() {
            if let Some(ar) = self.crds.autoscaler_resource(kind) {
                delete_child(self.kube, &ar, ns, name).await?;
            }
        }
        Ok(())
    }

    fn required(&self, kind: AutoscalerKind) -> Result<ApiResource, Error> {
        self.crds.autoscaler_resource(kind).ok_or_else(|| {
            Error::config(
                AUTOSCALER_CLASS_ANNOTATION,
                format!("{} CRD is not installed in the cluster", kind.kind()),
            )
        })
    }

    async fn remove_stale_head_services(
        &self,
        isvc_name: &str,
        ns: &str,
        current: &str,
    ) -> Result<(), Error> {
        let ar = Service::api_resource();
        let selector = format!("{ISVC_LABEL}={isvc_name},{HEAD_SVC_GENERATION_LABEL}");
        let live = self.kube.list_names(&ar, ns, &selector).await?;
        for name in stale_head_services(&live, current) {
            info!(service = %name, "deleting head service of an older generation");
            self.kube.delete(&ar, ns, &name).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use crate::controller::MockIsvcKubeClient;

    type Store = Arc<Mutex<BTreeMap<String, Value>>>;

    fn key(ar: &ApiResource, name: &str) -> String {
        format!("{}/{}", ar.kind, name)
    }

    /// Mock backed by an in-memory object store
    fn store_mock(store: &Store) -> MockIsvcKubeClient {
        let mut mock = MockIsvcKubeClient::new();
        let reads = store.clone();
        mock.expect_get_json()
            .returning(move |ar, _, name| Ok(reads.lock().unwrap().get(&key(ar, name)).cloned()));
        let writes = store.clone();
        mock.expect_apply_json().returning(move |ar, _, name, body| {
            writes
                .lock()
                .unwrap()
                .insert(key(ar, name), body.clone());
            Ok(body)
        });
        let deletes = store.clone();
        mock.expect_delete().returning(move |ar, _, name| {
            deletes.lock().unwrap().remove(&key(ar, name));
            Ok(())
        });
        mock.expect_list_names().returning(|_, _, _| Ok(vec![]));
        mock
    }

    fn request<'a>(
        extension: &'a ComponentExtensionSpec,
        annotations: &'a BTreeMap<String, String>,
        empty: &'a BTreeMap<String, String>,
        otel: &'a OtelCollectorConfig,
    ) -> ComponentRequest<'a> {
        ComponentRequest {
            isvc_name: "raw-foo",
            namespace: "default",
            generation: 1,
            component: Component::Predictor,
            extension,
            containers: vec![ContainerSpec {
                image: "kserve/sklearnserver:latest".to_string(),
                ..Default::default()
            }],
            service_account_name: None,
            pod_annotations: BTreeMap::new(),
            worker: None,
            labels: empty,
            annotations: empty,
            isvc_annotations: annotations,
            otel,
            owner: None,
        }
    }

    fn class(value: &str) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        annotations.insert(AUTOSCALER_CLASS_ANNOTATION.to_string(), value.to_string());
        annotations
    }

    // =========================================================================
    // Story: Exactly one autoscaler kind per component
    // =========================================================================

    /// Story: switching from HPA to KEDA removes the HPA
    #[tokio::test]
    async fn story_autoscaler_kinds_are_mutually_exclusive() {
        let store: Store = Arc::default();
        let mock = store_mock(&store);
        let crds = DiscoveredCrds::hardcoded_defaults();
        let reconciler = ComponentReconciler::new(&mock, &crds);
        let ext = ComponentExtensionSpec::default();
        let empty = BTreeMap::new();
        let otel = OtelCollectorConfig::default();

        let hpa = class("hpa");
        reconciler
            .reconcile(request(&ext, &hpa, &empty, &otel))
            .await
            .unwrap();
        assert!(store
            .lock()
            .unwrap()
            .contains_key("HorizontalPodAutoscaler/raw-foo-predictor"));

        let keda = class("keda");
        reconciler
            .reconcile(request(&ext, &keda, &empty, &otel))
            .await
            .unwrap();
        let objects = store.lock().unwrap();
        assert!(objects.contains_key("ScaledObject/raw-foo-predictor"));
        assert!(!objects.contains_key("HorizontalPodAutoscaler/raw-foo-predictor"));
        assert!(!objects.contains_key("OpenTelemetryCollector/raw-foo-predictor"));
    }

    /// Story: replicas scaled out of band survive an unrelated change
    #[tokio::test]
    async fn story_external_class_keeps_live_replicas() {
        let store: Store = Arc::default();
        let mock = store_mock(&store);
        let crds = DiscoveredCrds::hardcoded_defaults();
        let reconciler = ComponentReconciler::new(&mock, &crds);
        let ext = ComponentExtensionSpec::default();
        let empty = BTreeMap::new();
        let otel = OtelCollectorConfig::default();
        let external = class("external");

        reconciler
            .reconcile(request(&ext, &external, &empty, &otel))
            .await
            .unwrap();
        {
            let mut objects = store.lock().unwrap();
            let deployment = objects
                .get_mut("Deployment/raw-foo-predictor")
                .unwrap();
            assert_eq!(deployment["spec"]["replicas"], 1);
            deployment["spec"]["replicas"] = json!(5);
        }

        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "ml".to_string());
        let mut req = request(&ext, &external, &empty, &otel);
        req.labels = &labels;
        reconciler.reconcile(req).await.unwrap();

        let objects = store.lock().unwrap();
        let deployment = &objects["Deployment/raw-foo-predictor"];
        assert_eq!(deployment["spec"]["replicas"], 5);
        assert_eq!(deployment["metadata"]["labels"]["team"], "ml");
    }

    #[tokio::test]
    async fn hpa_class_leaves_replicas_unset() {
        let store: Store = Arc::default();
        let mock = store_mock(&store);
        let crds = DiscoveredCrds::hardcoded_defaults();
        let ext = ComponentExtensionSpec::default();
        let empty = BTreeMap::new();
        let otel = OtelCollectorConfig::default();

        ComponentReconciler::new(&mock, &crds)
            .reconcile(request(&ext, &empty, &empty, &otel))
            .await
            .unwrap();
        let objects = store.lock().unwrap();
        assert!(objects["Deployment/raw-foo-predictor"]["spec"]
            .get("replicas")
            .is_none());
    }

    #[tokio::test]
    async fn keda_without_crd_is_a_config_error() {
        let store: Store = Arc::default();
        let mock = store_mock(&store);
        let crds = DiscoveredCrds {
            scaled_object: None,
            ..DiscoveredCrds::hardcoded_defaults()
        };
        let ext = ComponentExtensionSpec::default();
        let empty = BTreeMap::new();
        let otel = OtelCollectorConfig::default();
        let keda = class("keda");

        let err = ComponentReconciler::new(&mock, &crds)
            .reconcile(request(&ext, &keda, &empty, &otel))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "ConfigInvalid");
    }

    /// Story: quantities rewritten into canonical form by the API server
    /// cause no further writes
    #[tokio::test]
    async fn story_canonical_quantities_are_not_reapplied() {
        let store: Store = Arc::default();
        let crds = DiscoveredCrds::hardcoded_defaults();
        let ext = ComponentExtensionSpec::default();
        let empty = BTreeMap::new();
        let otel = OtelCollectorConfig::default();
        fn sized(mut req: ComponentRequest<'_>) -> ComponentRequest<'_> {
            req.containers[0]
                .resources
                .requests
                .insert("cpu".to_string(), "0.5".to_string());
            req
        }

        ComponentReconciler::new(&store_mock(&store), &crds)
            .reconcile(sized(request(&ext, &empty, &empty, &otel)))
            .await
            .unwrap();
        {
            let mut objects = store.lock().unwrap();
            let deployment = objects.get_mut("Deployment/raw-foo-predictor").unwrap();
            *deployment
                .pointer_mut("/spec/template/spec/containers/0/resources/requests/cpu")
                .unwrap() = json!("500m");
        }

        let mut second = MockIsvcKubeClient::new();
        let reads = store.clone();
        second
            .expect_get_json()
            .returning(move |ar, _, name| Ok(reads.lock().unwrap().get(&key(ar, name)).cloned()));
        second.expect_apply_json().never();
        second.expect_list_names().returning(|_, _, _| Ok(vec![]));

        ComponentReconciler::new(&second, &crds)
            .reconcile(sized(request(&ext, &empty, &empty, &otel)))
            .await
            .unwrap();
    }

    // =========================================================================
    // Story: Multi-node predictor
    // =========================================================================

    #[tokio::test]
    async fn multi_node_applies_worker_and_head_service() {
        let store: Store = Arc::default();
        let mut mock = MockIsvcKubeClient::new();
        let reads = store.clone();
        mock.expect_get_json()
            .returning(move |ar, _, name| Ok(reads.lock().unwrap().get(&key(ar, name)).cloned()));
        let writes = store.clone();
        mock.expect_apply_json().returning(move |ar, _, name, body| {
            writes.lock().unwrap().insert(key(ar, name), body.clone());
            Ok(body)
        });
        mock.expect_list_names().returning(|_, _, _| {
            Ok(vec![
                "raw-foo-predictor-head-1".to_string(),
                "raw-foo-predictor-head-2".to_string(),
            ])
        });
        mock.expect_delete()
            .withf(|_, _, name| name == "raw-foo-predictor-head-1")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let crds = DiscoveredCrds::hardcoded_defaults();
        let ext = ComponentExtensionSpec::default();
        let empty = BTreeMap::new();
        let otel = OtelCollectorConfig::default();
        let worker_spec = WorkerSpec {
            pipeline_parallel_size: Some(3),
            containers: vec![ContainerSpec {
                image: "kserve/huggingfaceserver:latest".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut req = request(&ext, &empty, &empty, &otel);
        req.generation = 2;
        req.worker = Some(WorkerSource {
            spec: &worker_spec,
            runtime: None,
        });

        ComponentReconciler::new(&mock, &crds)
            .reconcile(req)
            .await
            .unwrap();

        let objects = store.lock().unwrap();
        assert_eq!(
            objects["Deployment/raw-foo-predictor-worker"]["spec"]["replicas"],
            2
        );
        assert!(objects.contains_key("Service/raw-foo-predictor-head-2"));
        assert!(!objects.contains_key("HorizontalPodAutoscaler/raw-foo-predictor"));
    }
}
