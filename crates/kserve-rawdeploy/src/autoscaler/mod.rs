//! Autoscaler selection
//!
//! The autoscaler class is resolved once per component from the
//! `serving.kserve.io/autoscalerClass` annotation. [`AutoscalerPlan::select`]
//! turns the class into exactly one set of autoscaling objects and reports
//! which kinds must not exist, so switching classes removes the old object.

mod hpa;
mod keda;
mod otel;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kserve_common::config::OtelCollectorConfig;
use kserve_common::constants::{
    AUTOSCALER_CLASS_ANNOTATION, AUTOSCALER_METRICS_ANNOTATION, DEFAULT_CPU_UTILIZATION,
    DEFAULT_MIN_REPLICAS, OTEL_SIDECAR_INJECT_ANNOTATION, TARGET_UTILIZATION_ANNOTATION,
};
use kserve_common::crd::{ComponentExtensionSpec, MetricTargetType, ScaleMetric};
use kserve_common::kube_utils::{HasApiResource, OwnerReference};
use kserve_common::Error;

use crate::k8s::{HorizontalPodAutoscaler, OpenTelemetryCollector, ScaledObject};

pub use hpa::compile_hpa;
pub use keda::compile_scaled_object;
pub use otel::compile_collector;

// =============================================================================
// Class
// =============================================================================

/// Autoscaler class requested for an InferenceService
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutoscalerClass {
    /// Kubernetes HorizontalPodAutoscaler
    #[default]
    Hpa,
    /// KEDA ScaledObject
    Keda,
    /// Scaled by something outside this controller
    External,
    /// Fixed replica count
    None,
}

impl AutoscalerClass {
    /// Class from the InferenceService annotations; `hpa` when absent
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Result<Self, Error> {
        annotations
            .get(AUTOSCALER_CLASS_ANNOTATION)
            .map(|v| v.parse())
            .unwrap_or(Ok(Self::default()))
    }

    /// Annotation value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hpa => "hpa",
            Self::Keda => "keda",
            Self::External => "external",
            Self::None => "none",
        }
    }

    /// Whether an autoscaler object owns the Deployment replica count
    pub fn manages_replicas(&self) -> bool {
        matches!(self, Self::Hpa | Self::Keda)
    }
}

impl FromStr for AutoscalerClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hpa" => Ok(Self::Hpa),
            "keda" => Ok(Self::Keda),
            "external" => Ok(Self::External),
            "none" => Ok(Self::None),
            other => Err(Error::config(
                AUTOSCALER_CLASS_ANNOTATION,
                format!("unknown autoscaler class '{other}', expected one of hpa, keda, external, none"),
            )),
        }
    }
}

impl fmt::Display for AutoscalerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Inputs shared by every autoscaler builder
#[derive(Clone, Debug)]
pub struct AutoscalerInput<'a> {
    /// Object name (also the scaled Deployment's name)
    pub name: &'a str,
    /// Namespace
    pub namespace: &'a str,
    /// Labels for generated objects
    pub labels: &'a BTreeMap<String, String>,
    /// Propagated annotations for generated objects
    pub annotations: &'a BTreeMap<String, String>,
    /// All InferenceService annotations (metric selection reads these)
    pub isvc_annotations: &'a BTreeMap<String, String>,
    /// Component extension spec
    pub extension: &'a ComponentExtensionSpec,
    /// Port the main container serves metrics on
    pub metrics_port: i32,
    /// Collector and scaler endpoints
    pub otel: &'a OtelCollectorConfig,
    /// Controller owner reference
    pub owner: Option<OwnerReference>,
}

impl AutoscalerInput<'_> {
    /// (min, max) with min at least `floor` and max never below min
    pub(crate) fn replica_bounds(&self, floor: i32) -> (i32, i32) {
        let min = self
            .extension
            .min_replicas
            .unwrap_or(DEFAULT_MIN_REPLICAS)
            .max(floor);
        let max = self.extension.max_replicas.unwrap_or(0).max(min);
        (min, max)
    }

    /// Metric described by annotations or the untyped extension fields.
    ///
    /// Annotations win over `scaleMetric`/`scaleTarget`; CPU is the default.
    pub(crate) fn simple_metric(&self) -> Result<SimpleMetric, Error> {
        let annotated_metric = self
            .isvc_annotations
            .get(AUTOSCALER_METRICS_ANNOTATION)
            .map(|m| m.parse::<ScaleMetric>())
            .transpose()?;
        let annotated_target = self
            .isvc_annotations
            .get(TARGET_UTILIZATION_ANNOTATION)
            .map(|t| {
                t.parse::<i32>().map_err(|_| {
                    Error::config(
                        TARGET_UTILIZATION_ANNOTATION,
                        format!("target utilization '{t}' is not an integer"),
                    )
                })
            })
            .transpose()?;

        let annotated = annotated_metric.is_some() || annotated_target.is_some();
        let metric = annotated_metric
            .or(self.extension.scale_metric)
            .unwrap_or(ScaleMetric::Cpu);
        let target_type = if annotated {
            MetricTargetType::Utilization
        } else {
            self.extension.scale_metric_type.unwrap_or_default()
        };
        Ok(SimpleMetric {
            metric,
            target_type,
            target: annotated_target.or(self.extension.scale_target),
        })
    }
}

/// A single resource metric with an optional numeric target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SimpleMetric {
    pub metric: ScaleMetric,
    pub target_type: MetricTargetType,
    pub target: Option<i32>,
}

impl SimpleMetric {
    /// Target with the CPU utilization default applied
    pub(crate) fn target_or_default(&self) -> Option<i32> {
        match (self.target, self.metric) {
            (Some(t), _) => Some(t),
            (None, ScaleMetric::Cpu) => Some(DEFAULT_CPU_UTILIZATION),
            (None, ScaleMetric::Memory) => None,
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Autoscaler object kinds managed per component
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoscalerKind {
    /// HorizontalPodAutoscaler
    Hpa,
    /// KEDA ScaledObject
    ScaledObject,
    /// OpenTelemetryCollector sidecar
    OtelCollector,
}

impl AutoscalerKind {
    /// Kubernetes kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hpa => HorizontalPodAutoscaler::KIND,
            Self::ScaledObject => ScaledObject::KIND,
            Self::OtelCollector => OpenTelemetryCollector::KIND,
        }
    }
}

/// Autoscaling objects selected for one component
#[derive(Clone, Debug, PartialEq)]
pub enum AutoscalerPlan {
    /// An HPA targeting the component Deployment
    Hpa(HorizontalPodAutoscaler),
    /// A ScaledObject, plus a sidecar collector when pod metrics are used
    Keda {
        /// Scaled object
        scaled_object: ScaledObject,
        /// Metrics collector feeding the external trigger
        collector: Option<OpenTelemetryCollector>,
    },
    /// No autoscaler object
    Unmanaged,
}

impl AutoscalerPlan {
    /// Build the plan for a class
    pub fn select(class: AutoscalerClass, input: &AutoscalerInput<'_>) -> Result<Self, Error> {
        match class {
            AutoscalerClass::Hpa => Ok(Self::Hpa(compile_hpa(input)?)),
            AutoscalerClass::Keda => Ok(Self::Keda {
                scaled_object: compile_scaled_object(input)?,
                collector: compile_collector(input),
            }),
            AutoscalerClass::External | AutoscalerClass::None => Ok(Self::Unmanaged),
        }
    }

    /// Kinds that must be absent under this plan
    pub fn stale_kinds(&self) -> Vec<AutoscalerKind> {
        match self {
            Self::Hpa(_) => vec![AutoscalerKind::ScaledObject, AutoscalerKind::OtelCollector],
            Self::Keda {
                collector: Some(_), ..
            } => vec![AutoscalerKind::Hpa],
            Self::Keda { collector: None, .. } => {
                vec![AutoscalerKind::Hpa, AutoscalerKind::OtelCollector]
            }
            Self::Unmanaged => vec![
                AutoscalerKind::Hpa,
                AutoscalerKind::ScaledObject,
                AutoscalerKind::OtelCollector,
            ],
        }
    }

    /// Pod template annotations the plan requires
    pub fn pod_annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        if let Self::Keda {
            collector: Some(collector),
            ..
        } = self
        {
            annotations.insert(
                OTEL_SIDECAR_INJECT_ANNOTATION.to_string(),
                collector.metadata.name.clone(),
            );
        }
        annotations
    }
}

/// Parse a metric target quantity as a float and format it the way KEDA expects
pub(crate) fn format_threshold(key: &str, raw: Option<&str>) -> Result<String, Error> {
    let raw = raw.ok_or_else(|| Error::config(key, "metric target value is required"))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| Error::config(key, format!("metric target '{raw}' is not a number")))?;
    Ok(format!("{value:.6}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn input<'a>(
        ext: &'a ComponentExtensionSpec,
        isvc_annotations: &'a BTreeMap<String, String>,
        empty: &'a BTreeMap<String, String>,
        otel: &'a OtelCollectorConfig,
    ) -> AutoscalerInput<'a> {
        AutoscalerInput {
            name: "raw-foo-predictor",
            namespace: "default",
            labels: empty,
            annotations: empty,
            isvc_annotations,
            extension: ext,
            metrics_port: 8080,
            otel,
            owner: None,
        }
    }

    #[rstest]
    #[case("hpa", AutoscalerClass::Hpa)]
    #[case("keda", AutoscalerClass::Keda)]
    #[case("external", AutoscalerClass::External)]
    #[case("none", AutoscalerClass::None)]
    fn class_parses(#[case] raw: &str, #[case] expected: AutoscalerClass) {
        let ann = annotations(&[(AUTOSCALER_CLASS_ANNOTATION, raw)]);
        assert_eq!(AutoscalerClass::from_annotations(&ann).unwrap(), expected);
    }

    #[test]
    fn class_defaults_to_hpa() {
        assert_eq!(
            AutoscalerClass::from_annotations(&BTreeMap::new()).unwrap(),
            AutoscalerClass::Hpa
        );
    }

    #[test]
    fn unknown_class_is_config_error() {
        let ann = annotations(&[(AUTOSCALER_CLASS_ANNOTATION, "vpa")]);
        let err = AutoscalerClass::from_annotations(&ann).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn bounds_clamp_max_to_min() {
        let ext = ComponentExtensionSpec {
            min_replicas: Some(5),
            max_replicas: Some(3),
            ..Default::default()
        };
        let (empty, otel) = (BTreeMap::new(), OtelCollectorConfig::default());
        let i = input(&ext, &empty, &empty, &otel);
        assert_eq!(i.replica_bounds(1), (5, 5));

        let ext = ComponentExtensionSpec {
            min_replicas: Some(0),
            ..Default::default()
        };
        let i = input(&ext, &empty, &empty, &otel);
        assert_eq!(i.replica_bounds(1), (1, 1));
        assert_eq!(i.replica_bounds(0), (0, 0));
    }

    #[test]
    fn annotations_win_over_scale_metric() {
        let ext = ComponentExtensionSpec {
            scale_metric: Some(ScaleMetric::Memory),
            scale_target: Some(50),
            ..Default::default()
        };
        let ann = annotations(&[
            (AUTOSCALER_METRICS_ANNOTATION, "cpu"),
            (TARGET_UTILIZATION_ANNOTATION, "75"),
        ]);
        let (empty, otel) = (BTreeMap::new(), OtelCollectorConfig::default());
        let metric = input(&ext, &ann, &empty, &otel).simple_metric().unwrap();
        assert_eq!(metric.metric, ScaleMetric::Cpu);
        assert_eq!(metric.target, Some(75));
        assert_eq!(metric.target_type, MetricTargetType::Utilization);
    }

    #[test]
    fn bad_target_annotation_is_config_error() {
        let ext = ComponentExtensionSpec::default();
        let ann = annotations(&[(TARGET_UTILIZATION_ANNOTATION, "lots")]);
        let (empty, otel) = (BTreeMap::new(), OtelCollectorConfig::default());
        assert!(input(&ext, &ann, &empty, &otel).simple_metric().is_err());
    }

    /// Story: each class yields exactly one autoscaler shape
    #[test]
    fn story_plans_are_mutually_exclusive() {
        let ext = ComponentExtensionSpec {
            max_replicas: Some(3),
            ..Default::default()
        };
        let (empty, otel) = (BTreeMap::new(), OtelCollectorConfig::default());
        let i = input(&ext, &empty, &empty, &otel);

        let hpa = AutoscalerPlan::select(AutoscalerClass::Hpa, &i).unwrap();
        assert!(matches!(hpa, AutoscalerPlan::Hpa(_)));
        assert_eq!(
            hpa.stale_kinds(),
            vec![AutoscalerKind::ScaledObject, AutoscalerKind::OtelCollector]
        );

        let keda = AutoscalerPlan::select(AutoscalerClass::Keda, &i).unwrap();
        assert!(matches!(keda, AutoscalerPlan::Keda { collector: None, .. }));
        assert!(keda.stale_kinds().contains(&AutoscalerKind::Hpa));
        assert!(keda.pod_annotations().is_empty());

        for class in [AutoscalerClass::External, AutoscalerClass::None] {
            let plan = AutoscalerPlan::select(class, &i).unwrap();
            assert_eq!(plan, AutoscalerPlan::Unmanaged);
            assert_eq!(plan.stale_kinds().len(), 3);
        }
    }

    #[test]
    fn threshold_formats_with_six_decimals() {
        assert_eq!(format_threshold("k", Some("100")).unwrap(), "100.000000");
        assert_eq!(format_threshold("k", Some("0.5")).unwrap(), "0.500000");
        assert!(format_threshold("k", Some("1Gi")).is_err());
        assert!(format_threshold("k", None).is_err());
    }
}
