//! ServingRuntime CRD types (read-only input)
//!
//! Only the fields used to pick a runtime for a model and to build the
//! predictor and worker containers are modeled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ContainerSpec;

/// Model server template that InferenceServices select by model format
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.kserve.io",
    version = "v1alpha1",
    kind = "ServingRuntime",
    plural = "servingruntimes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServingRuntimeSpec {
    /// Model formats this runtime can serve
    #[serde(default)]
    pub supported_model_formats: Vec<SupportedModelFormat>,

    /// Runtime containers; the first is the model server
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,

    /// Multi-node worker defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_spec: Option<RuntimeWorkerSpec>,

    /// Excluded from selection when true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

/// A model format supported by a runtime
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupportedModelFormat {
    /// Format name
    pub name: String,
    /// Format version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Eligible for selection without naming the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_select: Option<bool>,
    /// Higher wins among auto-selectable runtimes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// Worker defaults declared by a runtime
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeWorkerSpec {
    /// Default GPUs per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensor_parallel_size: Option<i32>,
    /// Default node count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_parallel_size: Option<i32>,
    /// Worker containers
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

impl ServingRuntimeSpec {
    /// Whether the runtime is disabled
    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    /// The supported format entry matching a model format name and version
    pub fn supports(&self, name: &str, version: Option<&str>) -> Option<&SupportedModelFormat> {
        self.supported_model_formats.iter().find(|f| {
            f.name.eq_ignore_ascii_case(name)
                && match (version, f.version.as_deref()) {
                    (Some(want), Some(have)) => want == have,
                    _ => true,
                }
        })
    }
}
