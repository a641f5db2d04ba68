//! KEDA ScaledObject builder

use std::collections::BTreeMap;

use kserve_common::constants::{AUTOSCALER_CLASS_ANNOTATION, DEFAULT_CPU_UTILIZATION};
use kserve_common::crd::{
    ExternalMetricSource, MetricSourceType, MetricTarget, MetricTargetType, MetricsBackend,
    PodMetricSource, ScaleMetric,
};
use kserve_common::kube_utils::ObjectMeta;
use kserve_common::Error;

use super::{format_threshold, AutoscalerInput, SimpleMetric};
use crate::k8s::{ScaleTargetRef, ScaledObject, ScaledObjectSpec, ScaledObjectTrigger, TriggerAuthenticationRef};

const DEFAULT_OPERATION_OVER_TIME: &str = "last_one";

/// Build the ScaledObject for a component
pub fn compile_scaled_object(input: &AutoscalerInput<'_>) -> Result<ScaledObject, Error> {
    let (min, max) = input.replica_bounds(0);
    let metadata = ObjectMeta::new(input.name, input.namespace)
        .with_labels(input.labels)
        .with_annotations(input.annotations)
        .with_owner(input.owner.clone());

    Ok(ScaledObject::new(
        metadata,
        ScaledObjectSpec {
            scale_target_ref: ScaleTargetRef::deployment(input.name),
            min_replica_count: min,
            max_replica_count: max,
            triggers: compile_triggers(input)?,
        },
    ))
}

fn compile_triggers(input: &AutoscalerInput<'_>) -> Result<Vec<ScaledObjectTrigger>, Error> {
    let typed = input
        .extension
        .auto_scaling
        .as_ref()
        .map(|a| a.metrics.as_slice())
        .unwrap_or_default();

    if typed.is_empty() {
        return Ok(vec![simple_trigger(input.simple_metric()?)]);
    }

    typed
        .iter()
        .map(|m| match m.type_ {
            MetricSourceType::Resource => m
                .resource
                .as_ref()
                .map(|r| Ok(resource_trigger(r.name, &r.target)))
                .unwrap_or_else(|| Err(missing_source("resource"))),
            MetricSourceType::External => m
                .external
                .as_ref()
                .map(external_trigger)
                .unwrap_or_else(|| Err(missing_source("external"))),
            MetricSourceType::PodMetric => m
                .podmetric
                .as_ref()
                .map(|p| pod_metric_trigger(p, &input.otel.metric_scaler_endpoint))
                .unwrap_or_else(|| Err(missing_source("podmetric"))),
        })
        .collect()
}

fn missing_source(field: &str) -> Error {
    Error::config(
        AUTOSCALER_CLASS_ANNOTATION,
        format!("autoscaling metric is missing its {field} source"),
    )
}

fn simple_trigger(metric: SimpleMetric) -> ScaledObjectTrigger {
    let value = metric.target.unwrap_or(DEFAULT_CPU_UTILIZATION);
    ScaledObjectTrigger {
        type_: metric.metric.as_str().to_string(),
        metric_type: Some(metric.target_type.as_str().to_string()),
        metadata: [("value".to_string(), value.to_string())]
            .into_iter()
            .collect(),
        authentication_ref: None,
    }
}

fn resource_trigger(name: ScaleMetric, target: &MetricTarget) -> ScaledObjectTrigger {
    let value = match target.type_ {
        MetricTargetType::Utilization => target
            .average_utilization
            .unwrap_or(DEFAULT_CPU_UTILIZATION)
            .to_string(),
        MetricTargetType::AverageValue => target
            .average_value
            .clone()
            .unwrap_or_else(|| DEFAULT_CPU_UTILIZATION.to_string()),
        MetricTargetType::Value => target
            .value
            .clone()
            .unwrap_or_else(|| DEFAULT_CPU_UTILIZATION.to_string()),
    };
    ScaledObjectTrigger {
        type_: name.as_str().to_string(),
        metric_type: Some(target.type_.as_str().to_string()),
        metadata: [("value".to_string(), value)].into_iter().collect(),
        authentication_ref: None,
    }
}

/// Threshold from a `Value` or `AverageValue` target
fn target_quantity(target: &MetricTarget) -> Option<&str> {
    target
        .value
        .as_deref()
        .or(target.average_value.as_deref())
}

fn external_trigger(source: &ExternalMetricSource) -> Result<ScaledObjectTrigger, Error> {
    let threshold = format_threshold(AUTOSCALER_CLASS_ANNOTATION, target_quantity(&source.target))?;
    let metric = &source.metric;
    let mut metadata = BTreeMap::new();

    let type_ = match metric.backend {
        MetricsBackend::Prometheus => {
            metadata.insert("serverAddress".to_string(), metric.server_address.clone());
            metadata.insert("query".to_string(), metric.query.clone());
            metadata.insert("threshold".to_string(), threshold);
            if let Some(ns) = &metric.namespace {
                metadata.insert("namespace".to_string(), ns.clone());
            }
            "prometheus"
        }
        MetricsBackend::Opentelemetry => {
            metadata.insert("scalerAddress".to_string(), metric.server_address.clone());
            metadata.insert("metricQuery".to_string(), metric.query.clone());
            metadata.insert("targetValue".to_string(), threshold);
            "external"
        }
    };

    let authentication_ref = source.authentication.as_ref().map(|auth| {
        if let Some(modes) = &auth.auth_modes {
            metadata.insert("authModes".to_string(), modes.clone());
        }
        TriggerAuthenticationRef {
            name: auth.authentication_ref.name.clone(),
        }
    });

    Ok(ScaledObjectTrigger {
        type_: type_.to_string(),
        metric_type: None,
        metadata,
        authentication_ref,
    })
}

fn pod_metric_trigger(
    source: &PodMetricSource,
    default_scaler: &str,
) -> Result<ScaledObjectTrigger, Error> {
    let metric = &source.metric;
    let mut metadata = BTreeMap::new();
    metadata.insert(
        "scalerAddress".to_string(),
        metric
            .server_address
            .clone()
            .unwrap_or_else(|| default_scaler.to_string()),
    );
    metadata.insert("metricQuery".to_string(), metric.query.clone());
    metadata.insert(
        "targetValue".to_string(),
        format_threshold(AUTOSCALER_CLASS_ANNOTATION, target_quantity(&source.target))?,
    );
    metadata.insert(
        "operationOverTime".to_string(),
        metric
            .operation_over_time
            .clone()
            .unwrap_or_else(|| DEFAULT_OPERATION_OVER_TIME.to_string()),
    );
    Ok(ScaledObjectTrigger {
        type_: "external".to_string(),
        metric_type: None,
        metadata,
        authentication_ref: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kserve_common::config::OtelCollectorConfig;
    use kserve_common::crd::{
        AuthenticationRef, AutoScalingSpec, ComponentExtensionSpec, ExtMetricAuthentication,
        ExternalMetrics, MetricsSpec, PodMetrics, ResourceMetricSource,
    };

    fn compile(ext: &ComponentExtensionSpec) -> Result<ScaledObject, Error> {
        let empty = BTreeMap::new();
        let otel = OtelCollectorConfig::default();
        compile_scaled_object(&AutoscalerInput {
            name: "test-component",
            namespace: "test-namespace",
            labels: &empty,
            annotations: &empty,
            isvc_annotations: &empty,
            extension: ext,
            metrics_port: 8080,
            otel: &otel,
            owner: None,
        })
    }

    fn with_metrics(metrics: Vec<MetricsSpec>) -> ComponentExtensionSpec {
        ComponentExtensionSpec {
            min_replicas: Some(1),
            max_replicas: Some(3),
            auto_scaling: Some(AutoScalingSpec { metrics }),
            ..Default::default()
        }
    }

    fn value_target(v: &str) -> MetricTarget {
        MetricTarget {
            type_: MetricTargetType::Value,
            value: Some(v.to_string()),
            ..Default::default()
        }
    }

    // =========================================================================
    // Story: Resource triggers
    // =========================================================================

    #[test]
    fn default_trigger_is_cpu_80() {
        let so = compile(&ComponentExtensionSpec {
            max_replicas: Some(3),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(so.spec.min_replica_count, 1);
        assert_eq!(so.spec.max_replica_count, 3);
        let trigger = &so.spec.triggers[0];
        assert_eq!(trigger.type_, "cpu");
        assert_eq!(trigger.metric_type.as_deref(), Some("Utilization"));
        assert_eq!(trigger.metadata["value"], "80");
    }

    #[test]
    fn memory_value_passes_quantity_through() {
        let so = compile(&with_metrics(vec![MetricsSpec {
            type_: MetricSourceType::Resource,
            resource: Some(ResourceMetricSource {
                name: ScaleMetric::Memory,
                target: value_target("512Mi"),
            }),
            external: None,
            podmetric: None,
        }]))
        .unwrap();
        assert_eq!(so.spec.triggers[0].type_, "memory");
        assert_eq!(so.spec.triggers[0].metadata["value"], "512Mi");
    }

    #[test]
    fn min_above_max_clamps_max() {
        let so = compile(&ComponentExtensionSpec {
            min_replicas: Some(5),
            max_replicas: Some(3),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(so.spec.min_replica_count, 5);
        assert_eq!(so.spec.max_replica_count, 5);
    }

    // =========================================================================
    // Story: External and pod metric triggers
    // =========================================================================

    #[test]
    fn prometheus_trigger_with_auth() {
        let so = compile(&with_metrics(vec![MetricsSpec {
            type_: MetricSourceType::External,
            resource: None,
            external: Some(ExternalMetricSource {
                metric: ExternalMetrics {
                    backend: MetricsBackend::Prometheus,
                    server_address: "http://prometheus-server".to_string(),
                    query: "http_requests_total".to_string(),
                    namespace: Some("test-ns".to_string()),
                },
                target: value_target("123"),
                authentication: Some(ExtMetricAuthentication {
                    auth_modes: Some("bearer".to_string()),
                    authentication_ref: AuthenticationRef {
                        name: "auth-secret".to_string(),
                    },
                }),
            }),
            podmetric: None,
        }]))
        .unwrap();
        let trigger = &so.spec.triggers[0];
        assert_eq!(trigger.type_, "prometheus");
        assert_eq!(trigger.metadata["serverAddress"], "http://prometheus-server");
        assert_eq!(trigger.metadata["query"], "http_requests_total");
        assert_eq!(trigger.metadata["threshold"], "123.000000");
        assert_eq!(trigger.metadata["namespace"], "test-ns");
        assert_eq!(trigger.metadata["authModes"], "bearer");
        assert_eq!(
            trigger.authentication_ref.as_ref().map(|a| a.name.as_str()),
            Some("auth-secret")
        );
    }

    #[test]
    fn pod_metric_trigger_defaults() {
        let so = compile(&with_metrics(vec![MetricsSpec {
            type_: MetricSourceType::PodMetric,
            resource: None,
            external: None,
            podmetric: Some(PodMetricSource {
                metric: PodMetrics {
                    backend: MetricsBackend::Opentelemetry,
                    server_address: None,
                    query: "otel_query".to_string(),
                    operation_over_time: None,
                    metric_names: vec![],
                },
                target: value_target("200"),
            }),
        }]))
        .unwrap();
        let trigger = &so.spec.triggers[0];
        assert_eq!(trigger.type_, "external");
        assert_eq!(trigger.metadata["metricQuery"], "otel_query");
        assert_eq!(trigger.metadata["targetValue"], "200.000000");
        assert_eq!(
            trigger.metadata["scalerAddress"],
            OtelCollectorConfig::default().metric_scaler_endpoint
        );
        assert_eq!(trigger.metadata["operationOverTime"], "last_one");
    }

    #[test]
    fn non_numeric_threshold_is_config_error() {
        let err = compile(&with_metrics(vec![MetricsSpec {
            type_: MetricSourceType::External,
            resource: None,
            external: Some(ExternalMetricSource {
                metric: ExternalMetrics::default(),
                target: value_target("many"),
                authentication: None,
            }),
            podmetric: None,
        }]))
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
