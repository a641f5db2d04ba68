//! Controller runner - builds the InferenceService controller future
//!
//! Kept separate from `main` so construction stays free of process setup.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DynamicObject;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use kserve_common::config::CONFIG_MAP_NAME;
use kserve_common::crd::InferenceService;
use kserve_rawdeploy::controller::{error_policy, reconcile, Context, DiscoveredCrds};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the InferenceService controller futures.
///
/// The controller watches every child kind it writes, plus the controller
/// ConfigMap: a config change requeues every InferenceService.
pub fn build_inference_service_controllers(
    client: Client,
    crds: Arc<DiscoveredCrds>,
    system_namespace: &str,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let ctx = Arc::new(Context::from_client(client.clone(), crds.clone()));
    let isvcs: Api<InferenceService> = Api::all(client.clone());

    let mut controller = Controller::new(isvcs, watcher_config())
        .owns(Api::<Deployment>::all(client.clone()), watcher_config())
        .owns(Api::<Service>::all(client.clone()), watcher_config())
        .owns(
            Api::<HorizontalPodAutoscaler>::all(client.clone()),
            watcher_config(),
        )
        .owns(Api::<Ingress>::all(client.clone()), watcher_config());

    for ar in [crds.http_route.clone(), crds.scaled_object.clone()]
        .into_iter()
        .flatten()
    {
        tracing::info!(kind = %ar.kind, api_version = %ar.api_version, "watching owned kind");
        let api: Api<DynamicObject> = Api::all_with(client.clone(), &ar);
        controller = controller.owns_with(api, ar, watcher_config());
    }

    let store = controller.store();
    let config_maps: Api<ConfigMap> = Api::namespaced(client, system_namespace);
    let controller = controller
        .watches(
            config_maps,
            watcher_config().fields(&format!("metadata.name={CONFIG_MAP_NAME}")),
            move |_| {
                tracing::debug!("controller config changed, requeueing all inference services");
                store
                    .state()
                    .into_iter()
                    .map(|isvc| ObjectRef::from_obj(&*isvc))
                    .collect::<Vec<_>>()
            },
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("InferenceService"));

    tracing::info!("- InferenceService controller");
    vec![Box::pin(controller)]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
