//! Controller configuration loaded from the `inferenceservice-config` ConfigMap
//!
//! Each ConfigMap key holds a JSON document. The parsed value is immutable and
//! built once per reconcile, so a ConfigMap edit is picked up on the next pass
//! without any shared mutable state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::template::{TemplateEngine, TemplateValues};
use crate::Error;

/// Name of the controller ConfigMap
pub const CONFIG_MAP_NAME: &str = "inferenceservice-config";
/// ConfigMap key holding [`IngressConfig`]
pub const INGRESS_CONFIG_KEY: &str = "ingress";
/// ConfigMap key holding [`DeployConfig`]
pub const DEPLOY_CONFIG_KEY: &str = "deploy";
/// ConfigMap key holding [`OtelCollectorConfig`]
pub const OTEL_COLLECTOR_CONFIG_KEY: &str = "opentelemetryCollector";

/// Default domain template
pub const DEFAULT_DOMAIN_TEMPLATE: &str = "{{ .Name }}-{{ .Namespace }}.{{ .IngressDomain }}";

// =============================================================================
// Deployment mode
// =============================================================================

/// How an InferenceService is deployed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    /// Plain Deployments and Services, handled by this controller
    #[default]
    RawDeployment,
    /// Knative Services, handled elsewhere
    Serverless,
    /// ModelMesh, handled elsewhere
    ModelMesh,
}

impl FromStr for DeploymentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RawDeployment" => Ok(Self::RawDeployment),
            "Serverless" => Ok(Self::Serverless),
            "ModelMesh" => Ok(Self::ModelMesh),
            other => Err(Error::config(
                crate::constants::DEPLOYMENT_MODE_ANNOTATION,
                format!("unknown deployment mode '{other}'"),
            )),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawDeployment => write!(f, "RawDeployment"),
            Self::Serverless => write!(f, "Serverless"),
            Self::ModelMesh => write!(f, "ModelMesh"),
        }
    }
}

// =============================================================================
// Ingress
// =============================================================================

/// Routing configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    /// Legacy ingress gateway (`namespace/name`)
    #[serde(default)]
    pub ingress_gateway: String,
    /// Gateway API Gateway used as the HTTPRoute parent (`namespace/name`)
    #[serde(default)]
    pub kserve_ingress_gateway: String,
    /// Base domain for generated hosts
    #[serde(default = "default_ingress_domain")]
    pub ingress_domain: String,
    /// IngressClass for classic Ingress objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    /// Host template
    #[serde(default = "default_domain_template")]
    pub domain_template: String,
    /// Scheme of the externally visible URL
    #[serde(default = "default_url_scheme")]
    pub url_scheme: String,
    /// Optional path template enabling path-based routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_template: Option<String>,
    /// Extra hostnames served by the top-level route
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_ingress_domains: Vec<String>,
    /// Emit Gateway API HTTPRoutes instead of classic Ingress
    #[serde(default)]
    pub enable_gateway_api: bool,
    /// Emit no route objects at all
    #[serde(default)]
    pub disable_ingress_creation: bool,
}

fn default_ingress_domain() -> String {
    "example.com".to_string()
}

fn default_domain_template() -> String {
    DEFAULT_DOMAIN_TEMPLATE.to_string()
}

fn default_url_scheme() -> String {
    "http".to_string()
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            ingress_gateway: String::new(),
            kserve_ingress_gateway: String::new(),
            ingress_domain: default_ingress_domain(),
            ingress_class_name: None,
            domain_template: default_domain_template(),
            url_scheme: default_url_scheme(),
            path_template: None,
            additional_ingress_domains: Vec::new(),
            enable_gateway_api: false,
            disable_ingress_creation: false,
        }
    }
}

impl IngressConfig {
    /// Path template, treating an empty string as unset
    pub fn path_template(&self) -> Option<&str> {
        self.path_template.as_deref().filter(|t| !t.is_empty())
    }

    /// Split `kserveIngressGateway` into (namespace, name)
    pub fn kserve_gateway(&self) -> Result<(&str, &str), Error> {
        match self.kserve_ingress_gateway.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((ns, name))
            }
            _ => Err(Error::config(
                INGRESS_CONFIG_KEY,
                format!(
                    "kserveIngressGateway '{}' must be in the format 'namespace/name'",
                    self.kserve_ingress_gateway
                ),
            )),
        }
    }

    /// Check gateway reference and templates before any object is generated
    pub fn validate(&self) -> Result<(), Error> {
        if self.enable_gateway_api {
            self.kserve_gateway()?;
        }
        let engine = TemplateEngine::new();
        let sample = TemplateValues {
            name: "sample".to_string(),
            namespace: "default".to_string(),
            ingress_domain: self.ingress_domain.clone(),
            ..Default::default()
        };
        engine.render_domain(&self.domain_template, &sample)?;
        if let Some(path) = self.path_template() {
            engine.render(path, &sample)?;
        }
        Ok(())
    }
}

// =============================================================================
// Deploy
// =============================================================================

/// Deployment defaults
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    /// Mode applied when the InferenceService has no deployment mode annotation
    #[serde(default)]
    pub default_deployment_mode: DeploymentMode,
}

// =============================================================================
// OpenTelemetry collector
// =============================================================================

/// Settings for OpenTelemetry-backed pod metric autoscaling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtelCollectorConfig {
    /// Prometheus scrape interval of the sidecar collector
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: String,
    /// OTLP endpoint the collector exports metrics to
    #[serde(default = "default_metric_receiver_endpoint")]
    pub metric_receiver_endpoint: String,
    /// Address KEDA queries for the external scaler
    #[serde(default = "default_metric_scaler_endpoint")]
    pub metric_scaler_endpoint: String,
}

fn default_scrape_interval() -> String {
    "5s".to_string()
}

fn default_metric_receiver_endpoint() -> String {
    "keda-otel-scaler.keda.svc:4317".to_string()
}

fn default_metric_scaler_endpoint() -> String {
    "keda-otel-scaler.keda.svc:4318".to_string()
}

impl Default for OtelCollectorConfig {
    fn default() -> Self {
        Self {
            scrape_interval: default_scrape_interval(),
            metric_receiver_endpoint: default_metric_receiver_endpoint(),
            metric_scaler_endpoint: default_metric_scaler_endpoint(),
        }
    }
}

// =============================================================================
// Aggregate
// =============================================================================

/// All controller configuration sections
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceServicesConfig {
    /// `ingress` key
    pub ingress: IngressConfig,
    /// `deploy` key
    pub deploy: DeployConfig,
    /// `opentelemetryCollector` key
    pub opentelemetry_collector: OtelCollectorConfig,
}

impl InferenceServicesConfig {
    /// Parse the ConfigMap data, applying defaults for missing keys
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self, Error> {
        let config = Self {
            ingress: parse_key(data, INGRESS_CONFIG_KEY)?,
            deploy: parse_key(data, DEPLOY_CONFIG_KEY)?,
            opentelemetry_collector: parse_key(data, OTEL_COLLECTOR_CONFIG_KEY)?,
        };
        config.ingress.validate()?;
        Ok(config)
    }
}

fn parse_key<T>(data: &BTreeMap<String, String>, key: &str) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned + Default,
{
    match data.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::config(key, format!("unable to parse {key} config json: {e}"))),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_config_map_uses_defaults() {
        let config = InferenceServicesConfig::from_data(&BTreeMap::new()).unwrap();
        assert_eq!(config.ingress.ingress_domain, "example.com");
        assert_eq!(config.ingress.domain_template, DEFAULT_DOMAIN_TEMPLATE);
        assert_eq!(config.ingress.url_scheme, "http");
        assert_eq!(
            config.deploy.default_deployment_mode,
            DeploymentMode::RawDeployment
        );
        assert_eq!(config.opentelemetry_collector.scrape_interval, "5s");
    }

    #[test]
    fn parses_gateway_api_ingress() {
        let config = InferenceServicesConfig::from_data(&data(&[(
            "ingress",
            r#"{
                "kserveIngressGateway": "kserve/kserve-ingress-gateway",
                "ingressDomain": "example.com",
                "enableGatewayApi": true,
                "additionalIngressDomains": ["additional.example.com"],
                "pathTemplate": "/serving/{{ .Namespace }}/{{ .Name }}"
            }"#,
        )]))
        .unwrap();
        assert!(config.ingress.enable_gateway_api);
        assert_eq!(
            config.ingress.kserve_gateway().unwrap(),
            ("kserve", "kserve-ingress-gateway")
        );
        assert_eq!(
            config.ingress.additional_ingress_domains,
            vec!["additional.example.com"]
        );
        assert!(config.ingress.path_template().is_some());
    }

    #[test]
    fn malformed_json_names_the_key() {
        let err = InferenceServicesConfig::from_data(&data(&[("deploy", "{not json")]))
            .unwrap_err();
        assert_eq!(err.context(), Some("deploy"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn gateway_api_requires_namespaced_gateway() {
        let err = InferenceServicesConfig::from_data(&data(&[(
            "ingress",
            r#"{"enableGatewayApi": true, "kserveIngressGateway": "no-namespace"}"#,
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("namespace/name"));
    }

    #[test]
    fn invalid_domain_template_is_rejected() {
        let err = InferenceServicesConfig::from_data(&data(&[(
            "ingress",
            r#"{"domainTemplate": "{{ .Missing }}.example.com"}"#,
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn empty_path_template_is_unset() {
        let config = IngressConfig {
            path_template: Some(String::new()),
            ..Default::default()
        };
        assert!(config.path_template().is_none());
    }

    #[test]
    fn deployment_mode_parses_known_values() {
        assert_eq!(
            "RawDeployment".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::RawDeployment
        );
        assert_eq!(
            "Serverless".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::Serverless
        );
        assert!("Raw".parse::<DeploymentMode>().is_err());
    }
}
