//! Route synthesis
//!
//! Routes are emitted only once every present component is ready, so traffic
//! is never sent to a Deployment that cannot serve it. With Gateway API
//! enabled each component gets its own HTTPRoute and the InferenceService gets
//! an aggregate route; otherwise one classic Ingress carries all host rules.

mod hosts;
mod httproute;
mod kube_ingress;

use std::collections::BTreeMap;

use kserve_common::config::IngressConfig;
use kserve_common::constants::Component;
use kserve_common::crd::{InferenceService, InferenceServiceSpec, InferenceServiceStatus};
use kserve_common::kube_utils::OwnerReference;
use kserve_common::Error;

pub use hosts::{is_cluster_local, RouteHosts};
pub use httproute::{route_readiness, HTTP_ROUTE_NOT_ACCEPTED, HTTP_ROUTE_NOT_READY};

use crate::k8s::{HttpRoute, Ingress};

/// Inputs for route synthesis
#[derive(Clone, Debug)]
pub struct RouteInput<'a> {
    /// InferenceService
    pub isvc: &'a InferenceService,
    /// InferenceService name
    pub isvc_name: &'a str,
    /// Namespace
    pub namespace: &'a str,
    /// Ingress configuration
    pub config: &'a IngressConfig,
    /// Resolved hosts
    pub hosts: &'a RouteHosts,
    /// Labels for generated objects
    pub labels: &'a BTreeMap<String, String>,
    /// Propagated annotations
    pub annotations: &'a BTreeMap<String, String>,
    /// Controller owner reference
    pub owner: Option<OwnerReference>,
}

/// Route objects to apply for an InferenceService
#[derive(Clone, Debug, PartialEq)]
pub enum RoutePlan {
    /// No route objects; ingress counts as ready
    Skipped,
    /// A component is not ready yet; ingress is not ready
    Gated {
        /// Condition reason
        reason: &'static str,
        /// Condition message
        message: String,
    },
    /// Gateway API routes, component routes first
    HttpRoutes(Vec<HttpRoute>),
    /// Classic Ingress
    Ingress(Ingress),
}

/// Component that receives traffic on the top-level host
pub fn entry_component(spec: &InferenceServiceSpec) -> Component {
    if spec.has_component(Component::Transformer) {
        Component::Transformer
    } else {
        Component::Predictor
    }
}

/// Reason used while a component's route is held back
fn gated_reason(component: Component) -> &'static str {
    match component {
        Component::Predictor => "PredictorIngressNotCreated",
        Component::Transformer => "TransformerIngressNotCreated",
        Component::Explainer => "ExplainerIngressNotCreated",
    }
}

/// Builds route objects
pub struct RouteSynthesizer;

impl RouteSynthesizer {
    /// Decide which routes to emit given current component readiness
    pub fn plan(
        input: &RouteInput<'_>,
        status: &InferenceServiceStatus,
    ) -> Result<RoutePlan, Error> {
        if input.config.disable_ingress_creation || is_cluster_local(input.isvc, input.config) {
            return Ok(RoutePlan::Skipped);
        }

        for component in input.isvc.spec.components() {
            if !status.is_condition_true(component.ready_condition()) {
                return Ok(RoutePlan::Gated {
                    reason: gated_reason(component),
                    message: format!("{component} is not ready, route not created"),
                });
            }
        }

        if input.config.enable_gateway_api {
            Ok(RoutePlan::HttpRoutes(httproute::compile_routes(input)?))
        } else {
            Ok(RoutePlan::Ingress(kube_ingress::compile_ingress(input)))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
