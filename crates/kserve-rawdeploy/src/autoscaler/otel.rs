//! OpenTelemetryCollector sidecar for pod metric autoscaling
//!
//! The collector scrapes the model server's Prometheus endpoint on localhost,
//! keeps only the metrics named by the pod metric sources and exports them
//! over OTLP to the KEDA external scaler.

use std::collections::BTreeMap;

use kserve_common::crd::{MetricSourceType, MetricsBackend};
use kserve_common::kube_utils::ObjectMeta;
use serde_json::json;

use super::AutoscalerInput;
use crate::k8s::{OpenTelemetryCollector, OtelCollectorSpec, OtelConfig, OtelPipeline, OtelService};

const RECEIVER: &str = "prometheus";
const FILTER_PROCESSOR: &str = "filter/metrics";
const EXPORTER: &str = "otlp";

/// Build the collector when any pod metric uses the OpenTelemetry backend
pub fn compile_collector(input: &AutoscalerInput<'_>) -> Option<OpenTelemetryCollector> {
    let metric_names = otel_metric_names(input)?;

    let mut receivers = BTreeMap::new();
    receivers.insert(
        RECEIVER.to_string(),
        json!({
            "config": {
                "scrape_configs": [{
                    "job_name": "otel-collector",
                    "scrape_interval": input.otel.scrape_interval,
                    "static_configs": [{
                        "targets": [format!("localhost:{}", input.metrics_port)]
                    }]
                }]
            }
        }),
    );

    let mut processors = BTreeMap::new();
    processors.insert(
        FILTER_PROCESSOR.to_string(),
        json!({
            "metrics": {
                "include": {
                    "match_type": "strict",
                    "metric_names": metric_names
                }
            }
        }),
    );

    let mut exporters = BTreeMap::new();
    exporters.insert(
        EXPORTER.to_string(),
        json!({
            "endpoint": input.otel.metric_receiver_endpoint,
            "compression": "none",
            "tls": { "insecure": true }
        }),
    );

    let mut pipelines = BTreeMap::new();
    pipelines.insert(
        "metrics".to_string(),
        OtelPipeline {
            receivers: vec![RECEIVER.to_string()],
            processors: vec![FILTER_PROCESSOR.to_string()],
            exporters: vec![EXPORTER.to_string()],
        },
    );

    let metadata = ObjectMeta::new(input.name, input.namespace)
        .with_labels(input.labels)
        .with_annotations(input.annotations)
        .with_owner(input.owner.clone());

    Some(OpenTelemetryCollector::new(
        metadata,
        OtelCollectorSpec {
            mode: "sidecar".to_string(),
            config: OtelConfig {
                receivers,
                processors,
                exporters,
                service: OtelService { pipelines },
            },
        },
    ))
}

/// Metric names kept by the filter, or `None` without an OpenTelemetry pod metric.
///
/// A source with no explicit names keeps the metric named by its query.
fn otel_metric_names(input: &AutoscalerInput<'_>) -> Option<Vec<String>> {
    let sources: Vec<_> = input
        .extension
        .auto_scaling
        .as_ref()?
        .metrics
        .iter()
        .filter(|m| m.type_ == MetricSourceType::PodMetric)
        .filter_map(|m| m.podmetric.as_ref())
        .filter(|p| p.metric.backend == MetricsBackend::Opentelemetry)
        .collect();
    if sources.is_empty() {
        return None;
    }

    let mut names: Vec<String> = Vec::new();
    for source in sources {
        let declared = if source.metric.metric_names.is_empty() {
            vec![source.metric.query.clone()]
        } else {
            source.metric.metric_names.clone()
        };
        for name in declared {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Some(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kserve_common::config::OtelCollectorConfig;
    use kserve_common::crd::{
        AutoScalingSpec, ComponentExtensionSpec, MetricTarget, MetricsSpec, PodMetricSource,
        PodMetrics,
    };

    fn pod_metric(names: &[&str]) -> MetricsSpec {
        MetricsSpec {
            type_: MetricSourceType::PodMetric,
            resource: None,
            external: None,
            podmetric: Some(PodMetricSource {
                metric: PodMetrics {
                    backend: MetricsBackend::Opentelemetry,
                    server_address: None,
                    query: "vllm:num_requests_running".to_string(),
                    operation_over_time: None,
                    metric_names: names.iter().map(|n| n.to_string()).collect(),
                },
                target: MetricTarget::default(),
            }),
        }
    }

    fn compile(ext: &ComponentExtensionSpec) -> Option<OpenTelemetryCollector> {
        let empty = BTreeMap::new();
        let otel = OtelCollectorConfig::default();
        compile_collector(&AutoscalerInput {
            name: "raw-foo-predictor",
            namespace: "default",
            labels: &empty,
            annotations: &empty,
            isvc_annotations: &empty,
            extension: ext,
            metrics_port: 8080,
            otel: &otel,
            owner: None,
        })
    }

    #[test]
    fn no_collector_without_pod_metrics() {
        assert!(compile(&ComponentExtensionSpec::default()).is_none());
    }

    /// Story: a pod metric yields a scrape, filter, export pipeline
    #[test]
    fn story_sidecar_pipeline() {
        let ext = ComponentExtensionSpec {
            auto_scaling: Some(AutoScalingSpec {
                metrics: vec![pod_metric(&["vllm:num_requests_running", "vllm:gpu_cache_usage"])],
            }),
            ..Default::default()
        };
        let collector = compile(&ext).unwrap();
        assert_eq!(collector.spec.mode, "sidecar");

        let config = &collector.spec.config;
        let scrape = &config.receivers["prometheus"]["config"]["scrape_configs"][0];
        assert_eq!(scrape["scrape_interval"], "5s");
        assert_eq!(scrape["static_configs"][0]["targets"][0], "localhost:8080");

        let include = &config.processors["filter/metrics"]["metrics"]["include"];
        assert_eq!(include["match_type"], "strict");
        assert_eq!(include["metric_names"].as_array().unwrap().len(), 2);

        let otlp = &config.exporters["otlp"];
        assert_eq!(otlp["compression"], "none");
        assert_eq!(otlp["tls"]["insecure"], true);

        let pipeline = &config.service.pipelines["metrics"];
        assert_eq!(pipeline.processors, vec!["filter/metrics".to_string()]);
    }

    #[test]
    fn query_used_when_no_metric_names() {
        let ext = ComponentExtensionSpec {
            auto_scaling: Some(AutoScalingSpec {
                metrics: vec![pod_metric(&[])],
            }),
            ..Default::default()
        };
        let collector = compile(&ext).unwrap();
        assert_eq!(
            collector.spec.config.processors["filter/metrics"]["metrics"]["include"]["metric_names"][0],
            "vllm:num_requests_running"
        );
    }
}
