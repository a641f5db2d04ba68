//! Service construction for components and the multi-node head

use std::collections::BTreeMap;

use kserve_common::constants::{
    app_label_value, APP_LABEL, COMPONENT_LABEL, HEAD_SVC_GENERATION_LABEL, ISVC_LABEL,
    SERVICE_PORT,
};
use kserve_common::kube_utils::{ObjectMeta, OwnerReference};

use super::deployment::serving_port;
use super::WorkloadInput;
use crate::k8s::{Service, ServicePort, ServiceSpec};

/// ClusterIP Service exposing the component on port 80
pub(crate) fn compile_service(input: &WorkloadInput<'_>) -> Service {
    let target_port = input
        .containers
        .first()
        .map(serving_port)
        .unwrap_or(kserve_common::constants::DEFAULT_CONTAINER_PORT);

    let metadata = ObjectMeta::new(&input.name, input.namespace)
        .with_labels(&input.labels)
        .with_label(ISVC_LABEL, input.isvc_name)
        .with_label(COMPONENT_LABEL, input.component.as_str())
        .with_annotations(&input.annotations)
        .with_owner(input.owner.clone());

    Service::new(
        metadata,
        ServiceSpec {
            type_: "ClusterIP".to_string(),
            cluster_ip: None,
            selector: app_selector(&input.name),
            ports: vec![ServicePort {
                name: "http".to_string(),
                port: SERVICE_PORT,
                target_port,
                protocol: "TCP".to_string(),
            }],
            publish_not_ready_addresses: None,
        },
    )
}

/// Headless Service the worker pods use to find the head pod.
///
/// Named per generation so a spec change brings up a fresh discovery record;
/// older generations are removed by the caller.
pub fn compile_head_service(
    name: &str,
    namespace: &str,
    isvc_name: &str,
    predictor_name: &str,
    generation: i64,
    target_port: i32,
    owner: Option<OwnerReference>,
) -> Service {
    let metadata = ObjectMeta::new(name, namespace)
        .with_label(ISVC_LABEL, isvc_name)
        .with_label(HEAD_SVC_GENERATION_LABEL, generation.to_string())
        .with_owner(owner);

    Service::new(
        metadata,
        ServiceSpec {
            type_: "ClusterIP".to_string(),
            cluster_ip: Some("None".to_string()),
            selector: app_selector(predictor_name),
            ports: vec![ServicePort {
                name: "http".to_string(),
                port: SERVICE_PORT,
                target_port,
                protocol: "TCP".to_string(),
            }],
            publish_not_ready_addresses: Some(true),
        },
    )
}

fn app_selector(object_name: &str) -> BTreeMap<String, String> {
    let mut selector = BTreeMap::new();
    selector.insert(APP_LABEL.to_string(), app_label_value(object_name));
    selector
}
