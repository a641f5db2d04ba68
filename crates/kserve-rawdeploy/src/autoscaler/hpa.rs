//! HorizontalPodAutoscaler builder

use kserve_common::constants::{AUTOSCALER_CLASS_ANNOTATION, DEFAULT_CPU_UTILIZATION};
use kserve_common::crd::{MetricSourceType, MetricTarget, MetricTargetType, ScaleMetric};
use kserve_common::kube_utils::ObjectMeta;
use kserve_common::Error;

use super::{AutoscalerInput, SimpleMetric};
use crate::k8s::{
    HorizontalPodAutoscaler, HpaBehavior, HpaMetric, HpaMetricTarget, HpaResourceMetric,
    HpaScalingPolicy, HpaScalingRules, HpaSpec, ScaleTargetRef,
};

/// Build the HPA for a component
pub fn compile_hpa(input: &AutoscalerInput<'_>) -> Result<HorizontalPodAutoscaler, Error> {
    let (min, max) = input.replica_bounds(1);
    let metadata = ObjectMeta::new(input.name, input.namespace)
        .with_labels(input.labels)
        .with_annotations(input.annotations)
        .with_owner(input.owner.clone());

    Ok(HorizontalPodAutoscaler::new(
        metadata,
        HpaSpec {
            scale_target_ref: ScaleTargetRef::deployment(input.name),
            min_replicas: min,
            max_replicas: max,
            metrics: compile_metrics(input)?,
            behavior: default_behavior(),
        },
    ))
}

/// Typed resource metrics when present, else the single annotated metric
fn compile_metrics(input: &AutoscalerInput<'_>) -> Result<Vec<HpaMetric>, Error> {
    let typed = input
        .extension
        .auto_scaling
        .as_ref()
        .map(|a| a.metrics.as_slice())
        .unwrap_or_default();

    if typed.is_empty() {
        return Ok(simple_metric(input.simple_metric()?).into_iter().collect());
    }

    typed
        .iter()
        .map(|m| match (m.type_, m.resource.as_ref()) {
            (MetricSourceType::Resource, Some(resource)) => {
                resource_metric(resource.name, &resource.target)
            }
            (MetricSourceType::Resource, None) => Err(Error::config(
                AUTOSCALER_CLASS_ANNOTATION,
                "Resource metric is missing its resource source",
            )),
            (other, _) => Err(Error::config(
                AUTOSCALER_CLASS_ANNOTATION,
                format!("{other:?} metrics require the keda autoscaler class"),
            )),
        })
        .collect()
}

fn simple_metric(metric: SimpleMetric) -> Option<HpaMetric> {
    let target = metric.target_or_default()?;
    let target = match metric.target_type {
        MetricTargetType::Utilization => HpaMetricTarget {
            type_: MetricTargetType::Utilization.as_str().to_string(),
            average_utilization: Some(target),
            average_value: None,
            value: None,
        },
        MetricTargetType::AverageValue => HpaMetricTarget {
            type_: MetricTargetType::AverageValue.as_str().to_string(),
            average_utilization: None,
            average_value: Some(target.to_string()),
            value: None,
        },
        MetricTargetType::Value => HpaMetricTarget {
            type_: MetricTargetType::Value.as_str().to_string(),
            average_utilization: None,
            average_value: None,
            value: Some(target.to_string()),
        },
    };
    Some(HpaMetric {
        type_: "Resource".to_string(),
        resource: Some(HpaResourceMetric {
            name: metric.metric.as_str().to_string(),
            target,
        }),
    })
}

fn resource_metric(name: ScaleMetric, target: &MetricTarget) -> Result<HpaMetric, Error> {
    let missing = |field: &str| {
        Error::config(
            AUTOSCALER_CLASS_ANNOTATION,
            format!("{} metric target of type {} needs {field}", name.as_str(), target.type_.as_str()),
        )
    };
    let hpa_target = match target.type_ {
        MetricTargetType::Utilization => HpaMetricTarget {
            type_: target.type_.as_str().to_string(),
            average_utilization: Some(
                target
                    .average_utilization
                    .unwrap_or(DEFAULT_CPU_UTILIZATION),
            ),
            average_value: None,
            value: None,
        },
        MetricTargetType::AverageValue => HpaMetricTarget {
            type_: target.type_.as_str().to_string(),
            average_utilization: None,
            average_value: Some(
                target
                    .average_value
                    .clone()
                    .ok_or_else(|| missing("averageValue"))?,
            ),
            value: None,
        },
        MetricTargetType::Value => HpaMetricTarget {
            type_: target.type_.as_str().to_string(),
            average_utilization: None,
            average_value: None,
            value: Some(target.value.clone().ok_or_else(|| missing("value"))?),
        },
    };
    Ok(HpaMetric {
        type_: "Resource".to_string(),
        resource: Some(HpaResourceMetric {
            name: name.as_str().to_string(),
            target: hpa_target,
        }),
    })
}

/// Scale up by up to 4 pods or 100% every 15s with no stabilization;
/// scale down by up to 100% every 15s.
fn default_behavior() -> HpaBehavior {
    HpaBehavior {
        scale_up: HpaScalingRules {
            stabilization_window_seconds: Some(0),
            select_policy: "Max".to_string(),
            policies: vec![policy("Pods", 4), policy("Percent", 100)],
        },
        scale_down: HpaScalingRules {
            stabilization_window_seconds: None,
            select_policy: "Max".to_string(),
            policies: vec![policy("Percent", 100)],
        },
    }
}

fn policy(type_: &str, value: i32) -> HpaScalingPolicy {
    HpaScalingPolicy {
        type_: type_.to_string(),
        value,
        period_seconds: 15,
    }
}
