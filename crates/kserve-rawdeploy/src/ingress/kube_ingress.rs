//! Classic networking.k8s.io/v1 Ingress synthesis
//!
//! A single Ingress named after the InferenceService carries one host rule
//! per route. Prefix paths cannot express the explain regex, so explain
//! requests on the top-level host go to the entry component like any other.

use kserve_common::constants::{Component, SERVICE_PORT};
use kserve_common::kube_utils::ObjectMeta;

use super::RouteInput;
use crate::k8s::{
    HttpIngressPath, HttpIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};

/// Build the Ingress for an InferenceService
pub(crate) fn compile_ingress(input: &RouteInput<'_>) -> Ingress {
    let hosts = input.hosts;
    let entry = super::entry_component(&input.isvc.spec);

    let mut rules = vec![host_rule(&hosts.top_level, "/", input, entry)];
    for host in &hosts.additional {
        rules.push(host_rule(host, "/", input, entry));
    }
    for component in [Component::Explainer, Component::Transformer, Component::Predictor] {
        if let Some(host) = hosts.component(component) {
            rules.push(host_rule(host, "/", input, component));
        }
    }
    if let Some(path) = &hosts.path {
        rules.push(host_rule(&hosts.ingress_domain, &format!("{path}/"), input, entry));
    }

    Ingress::new(
        ObjectMeta::new(input.isvc_name, input.namespace)
            .with_labels(input.labels)
            .with_annotations(input.annotations)
            .with_owner(input.owner.clone()),
        IngressSpec {
            ingress_class_name: input.config.ingress_class_name.clone(),
            rules,
        },
    )
}

fn host_rule(host: &str, path: &str, input: &RouteInput<'_>, target: Component) -> IngressRule {
    IngressRule {
        host: host.to_string(),
        http: HttpIngressRuleValue {
            paths: vec![HttpIngressPath {
                path: path.to_string(),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: IngressServiceBackend {
                        name: target.object_name(input.isvc_name),
                        port: ServiceBackendPort {
                            number: SERVICE_PORT,
                        },
                    },
                },
            }],
        },
    }
}
