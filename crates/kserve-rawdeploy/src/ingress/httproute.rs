//! Gateway API HTTPRoute synthesis and readiness

use kserve_common::constants::{
    host_regexp, Component, EXPLAIN_PREFIX, FALLBACK_PREFIX, HOST_HEADER, ISVC_NAMESPACE_HEADER,
    ISVC_NAME_HEADER, PATH_BASED_EXPLAIN_PREFIX, SERVICE_PORT,
};
use kserve_common::kube_utils::{ObjectMeta, CONDITION_ACCEPTED, STATUS_FALSE, STATUS_TRUE};
use kserve_common::Error;
use serde_json::Value;

use super::RouteInput;
use crate::k8s::{
    BackendRef, HttpHeader, HttpHeaderFilter, HttpHeaderMatch, HttpPathMatch, HttpRoute,
    HttpRouteFilter, HttpRouteMatch, HttpRouteRule, HttpRouteSpec, HttpRouteTimeouts, ParentRef,
};

/// Reason reported while the route has no parent status
pub const HTTP_ROUTE_NOT_READY: &str = "HttpRouteNotReady";
/// Reason reported when a parent has not accepted the route
pub const HTTP_ROUTE_NOT_ACCEPTED: &str = "HttpRouteNotAccepted";

/// One HTTPRoute per component plus the aggregate route, in apply order
pub(crate) fn compile_routes(input: &RouteInput<'_>) -> Result<Vec<HttpRoute>, Error> {
    let (gateway_ns, gateway_name) = input.config.kserve_gateway()?;
    let parent = ParentRef::gateway(gateway_ns, gateway_name, SERVICE_PORT);

    let mut routes = Vec::new();
    for component in input.isvc.spec.components() {
        if let Some(host) = input.hosts.component(component) {
            routes.push(component_route(input, component, host, &parent));
        }
    }
    routes.push(top_level_route(input, &parent));
    Ok(routes)
}

fn component_route(
    input: &RouteInput<'_>,
    component: Component,
    host: &str,
    parent: &ParentRef,
) -> HttpRoute {
    let name = component.object_name(input.isvc_name);
    let rule = rule(
        input,
        component,
        host_matches(FALLBACK_PREFIX, &[host.to_string()]),
    );
    HttpRoute::new(
        metadata(input, &name),
        HttpRouteSpec {
            parent_refs: vec![parent.clone()],
            hostnames: vec![host.to_string()],
            rules: vec![rule],
        },
    )
}

/// Aggregate route.
///
/// Explain requests are matched before the fallback so they reach the
/// explainer; everything else goes to the entry component.
fn top_level_route(input: &RouteInput<'_>, parent: &ParentRef) -> HttpRoute {
    let hosts = input.hosts;
    let entry = super::entry_component(&input.isvc.spec);
    let has_explainer = input.isvc.spec.has_component(Component::Explainer);

    let mut top_hosts = vec![hosts.top_level.clone()];
    top_hosts.extend(hosts.additional.iter().cloned());

    let mut rules = Vec::new();
    if has_explainer {
        rules.push(rule(
            input,
            Component::Explainer,
            host_matches(EXPLAIN_PREFIX, &top_hosts),
        ));
    }
    rules.push(rule(input, entry, host_matches(FALLBACK_PREFIX, &top_hosts)));

    let mut hostnames = top_hosts.clone();
    if let Some(path) = &hosts.path {
        let domain = [hosts.ingress_domain.clone()];
        if has_explainer {
            rules.push(rule(
                input,
                Component::Explainer,
                host_matches(&format!("{path}{PATH_BASED_EXPLAIN_PREFIX}"), &domain),
            ));
        }
        rules.push(rule(input, entry, host_matches(&format!("{path}/"), &domain)));
        if !hostnames.contains(&hosts.ingress_domain) {
            hostnames.push(hosts.ingress_domain.clone());
        }
    }

    HttpRoute::new(
        metadata(input, input.isvc_name),
        HttpRouteSpec {
            parent_refs: vec![parent.clone()],
            hostnames,
            rules,
        },
    )
}

fn metadata(input: &RouteInput<'_>, name: &str) -> ObjectMeta {
    ObjectMeta::new(name, input.namespace)
        .with_labels(input.labels)
        .with_annotations(input.annotations)
        .with_owner(input.owner.clone())
}

/// One match per host, each pairing the path regex with a Host header regex
fn host_matches(path_regex: &str, hosts: &[String]) -> Vec<HttpRouteMatch> {
    let mut matches: Vec<HttpRouteMatch> = Vec::new();
    for host in hosts {
        let candidate = HttpRouteMatch {
            path: Some(HttpPathMatch {
                type_: "RegularExpression".to_string(),
                value: path_regex.to_string(),
            }),
            headers: vec![HttpHeaderMatch {
                type_: "RegularExpression".to_string(),
                name: HOST_HEADER.to_string(),
                value: host_regexp(host),
            }],
        };
        if !matches.contains(&candidate) {
            matches.push(candidate);
        }
    }
    matches
}

fn rule(input: &RouteInput<'_>, target: Component, matches: Vec<HttpRouteMatch>) -> HttpRouteRule {
    let timeout = input
        .isvc
        .spec
        .extension(target)
        .map(|ext| ext.timeout_seconds(target))
        .unwrap_or_else(|| target.default_timeout_seconds());

    HttpRouteRule {
        matches,
        filters: vec![HttpRouteFilter {
            type_: "RequestHeaderModifier".to_string(),
            request_header_modifier: Some(HttpHeaderFilter {
                set: vec![
                    HttpHeader {
                        name: ISVC_NAME_HEADER.to_string(),
                        value: input.isvc_name.to_string(),
                    },
                    HttpHeader {
                        name: ISVC_NAMESPACE_HEADER.to_string(),
                        value: input.namespace.to_string(),
                    },
                ],
            }),
        }],
        backend_refs: vec![BackendRef::service(
            target.object_name(input.isvc_name),
            input.namespace,
            SERVICE_PORT,
        )],
        timeouts: Some(HttpRouteTimeouts {
            request: format!("{timeout}s"),
        }),
    }
}

/// Readiness of a live HTTPRoute.
///
/// Ready only when at least one parent reports status and every parent has
/// `Accepted=True` with no condition reporting False. On failure returns the
/// reason and message to surface on `IngressReady`.
pub fn route_readiness(live: &Value) -> Result<(), (String, String)> {
    let parents = live
        .pointer("/status/parents")
        .and_then(Value::as_array)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            (
                HTTP_ROUTE_NOT_READY.to_string(),
                "Parent status is not available".to_string(),
            )
        })?;

    for parent in parents {
        let conditions = parent
            .get("conditions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if let Some(failed) = conditions
            .iter()
            .find(|c| c.get("status").and_then(Value::as_str) == Some(STATUS_FALSE))
        {
            let field = |k: &str| {
                failed
                    .get(k)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            return Err((field("reason"), field("message")));
        }

        let accepted = conditions.iter().any(|c| {
            c.get("type").and_then(Value::as_str) == Some(CONDITION_ACCEPTED)
                && c.get("status").and_then(Value::as_str) == Some(STATUS_TRUE)
        });
        if !accepted {
            return Err((
                HTTP_ROUTE_NOT_ACCEPTED.to_string(),
                "Route has not been accepted by its parent gateway".to_string(),
            ));
        }
    }
    Ok(())
}
