//! Host and path resolution for routes

use std::collections::BTreeMap;

use kserve_common::config::IngressConfig;
use kserve_common::constants::{
    Component, CLUSTER_LOCAL_DOMAIN, CLUSTER_LOCAL_VISIBILITY, NETWORK_VISIBILITY_LABEL,
};
use kserve_common::crd::InferenceService;
use kserve_common::template::{TemplateEngine, TemplateValues};
use kserve_common::Error;
use kube::ResourceExt;

/// Hostnames and path prefix computed for an InferenceService
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteHosts {
    /// Host of the aggregate route
    pub top_level: String,
    /// Host of each present component's own route
    pub components: BTreeMap<Component, String>,
    /// Extra hostnames served by the aggregate route only
    pub additional: Vec<String>,
    /// Path prefix without trailing slash, when path routing is configured
    pub path: Option<String>,
    /// Ingress domain, the host for path-based rules
    pub ingress_domain: String,
}

impl RouteHosts {
    /// Resolve every host for the InferenceService
    pub fn resolve(
        isvc: &InferenceService,
        namespace: &str,
        config: &IngressConfig,
        engine: &TemplateEngine,
    ) -> Result<Self, Error> {
        let name = isvc.name_any();
        let values = |object_name: &str| TemplateValues {
            name: object_name.to_string(),
            namespace: namespace.to_string(),
            ingress_domain: config.ingress_domain.clone(),
            annotations: isvc.annotations().clone(),
            labels: isvc.labels().clone(),
        };

        let top_level = engine.render_domain(&config.domain_template, &values(&name))?;

        let mut components = BTreeMap::new();
        for component in isvc.spec.components() {
            let host =
                engine.render_domain(&config.domain_template, &values(&component.object_name(&name)))?;
            components.insert(component, host);
        }

        let mut additional: Vec<String> = Vec::new();
        for domain in &config.additional_ingress_domains {
            if domain != &top_level && !additional.contains(domain) {
                additional.push(domain.clone());
            }
        }

        let path = config
            .path_template()
            .map(|template| engine.render(template, &values(&name)))
            .transpose()?
            .map(|p| p.trim_end_matches('/').to_string());

        Ok(Self {
            top_level,
            components,
            additional,
            path,
            ingress_domain: config.ingress_domain.clone(),
        })
    }

    /// Host of a component's own route
    pub fn component(&self, component: Component) -> Option<&str> {
        self.components.get(&component).map(String::as_str)
    }
}

/// Whether the InferenceService must not be exposed outside the cluster
pub fn is_cluster_local(isvc: &InferenceService, config: &IngressConfig) -> bool {
    isvc.labels()
        .get(NETWORK_VISIBILITY_LABEL)
        .is_some_and(|v| v == CLUSTER_LOCAL_VISIBILITY)
        || config.ingress_domain == CLUSTER_LOCAL_DOMAIN
}
