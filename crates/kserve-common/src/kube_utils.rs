//! Shared Kubernetes utilities using kube-rs
//!
//! Generated child objects are plain serde structs. This module provides the
//! metadata they share, the `ApiResource` plumbing used to apply them through
//! `DynamicObject`, and the JSON subset check that keeps reconciles write-free
//! when nothing changed.

use std::collections::BTreeMap;

use kube::discovery::ApiResource;
use kube::Resource;
use serde_json::Value;
use tracing::{info, warn};

// =============================================================================
// ObjectMeta
// =============================================================================

/// Standard Kubernetes ObjectMeta for generated resources.
///
/// Adds the managed-by label on construction.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Owner references (the InferenceService)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Create new metadata with the managed-by label
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_KSERVE.to_string(),
        );
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels,
            annotations: BTreeMap::new(),
            owner_references: Vec::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Merge a set of labels
    pub fn with_labels(mut self, labels: &BTreeMap<String, String>) -> Self {
        self.labels
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Merge a set of annotations
    pub fn with_annotations(mut self, annotations: &BTreeMap<String, String>) -> Self {
        self.annotations
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set the controlling owner
    pub fn with_owner(mut self, owner: Option<OwnerReference>) -> Self {
        self.owner_references = owner.into_iter().collect();
        self
    }
}

/// Owner reference placed on every generated object
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Owner API version
    pub api_version: String,
    /// Owner kind
    pub kind: String,
    /// Owner name
    pub name: String,
    /// Owner UID
    pub uid: String,
    /// Marks the owner as the managing controller
    pub controller: bool,
    /// Blocks owner deletion until this object is gone
    pub block_owner_deletion: bool,
}

/// Build a controller owner reference for a typed resource.
///
/// Returns `None` for objects that have not been persisted yet (no UID).
pub fn controller_owner_ref<K>(obj: &K) -> Option<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    let meta = obj.meta();
    Some(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: meta.name.clone()?,
        uid: meta.uid.clone()?,
        controller: true,
        block_owner_deletion: true,
    })
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types that have a known API group, version, and kind.
///
/// Implement this for generated object types to derive their `ApiResource`
/// from their constants, keeping serialization and API calls consistent.
pub trait HasApiResource {
    /// Full API version (e.g., "autoscaling/v2", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "HorizontalPodAutoscaler")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from an apiVersion string and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version); the core group is empty
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Look up a resource in pre-computed API discovery results.
///
/// Returns `None` if the CRD is not installed (not an error).
pub fn find_discovered_resource(
    discovery: &kube::discovery::Discovery,
    group: &str,
    kind: &str,
) -> Option<ApiResource> {
    for api_group in discovery.groups() {
        if api_group.name() != group {
            continue;
        }
        for (ar, _caps) in api_group.resources_by_stability() {
            if ar.kind == kind {
                info!(group = %group, kind = %kind, api_version = %ar.api_version, "discovered CRD version");
                return Some(ar);
            }
        }
    }
    warn!(group = %group, kind = %kind, "CRD not found in API discovery");
    None
}

// =============================================================================
// Conditions
// =============================================================================

/// The "Available" condition type for deployments
pub const CONDITION_AVAILABLE: &str = "Available";
/// The "Progressing" condition type for deployments
pub const CONDITION_PROGRESSING: &str = "Progressing";
/// The "ReplicaFailure" condition type for deployments
pub const CONDITION_REPLICA_FAILURE: &str = "ReplicaFailure";
/// The "Accepted" condition type on route parents
pub const CONDITION_ACCEPTED: &str = "Accepted";
/// The "True" status value for conditions
pub const STATUS_TRUE: &str = "True";
/// The "False" status value for conditions
pub const STATUS_FALSE: &str = "False";

/// Accessors shared by Kubernetes condition types
pub trait HasConditionFields {
    /// Get the condition type field value
    fn type_field(&self) -> &str;
    /// Get the condition status field value
    fn status_field(&self) -> &str;
}

impl HasConditionFields for k8s_openapi::api::apps::v1::DeploymentCondition {
    fn type_field(&self) -> &str {
        &self.type_
    }
    fn status_field(&self) -> &str {
        &self.status
    }
}

/// Find a condition of the given type
pub fn find_condition<'a, T: HasConditionFields>(
    conditions: &'a [T],
    condition_type: &str,
) -> Option<&'a T> {
    conditions.iter().find(|c| c.type_field() == condition_type)
}

/// True when a condition of the given type has the given status
pub fn condition_has_status<T: HasConditionFields>(
    conditions: &[T],
    condition_type: &str,
    status: &str,
) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status_field() == status)
}

// =============================================================================
// Diffing
// =============================================================================

/// Object keys whose values are all resource quantities
const QUANTITY_MAPS: [&str; 2] = ["limits", "requests"];

/// True when every field set in `desired` has the same value in `live`.
///
/// Fields only present on the live object (defaults, status, server metadata)
/// are ignored. Arrays must match element-wise with equal length. Resource
/// quantities compare by value, since the API server stores them in
/// canonical form (`0.5` becomes `500m`, `1024Mi` becomes `1Gi`).
pub fn json_subset(desired: &Value, live: &Value) -> bool {
    subset(desired, live, false)
}

fn subset(desired: &Value, live: &Value, quantities: bool) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d.iter().all(|(k, dv)| {
            dv.is_null()
                || l.get(k).is_some_and(|lv| {
                    if quantities || is_quantity_field(d, k) {
                        quantity_eq(dv, lv)
                    } else {
                        subset(dv, lv, QUANTITY_MAPS.contains(&k.as_str()))
                    }
                })
        }),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| subset(dv, lv, false))
        }
        (Value::Number(d), Value::Number(l)) => d.as_f64() == l.as_f64(),
        _ => desired == live,
    }
}

/// Scalar quantity fields of autoscaling/v2 metric targets
fn is_quantity_field(object: &serde_json::Map<String, Value>, key: &str) -> bool {
    match key {
        "averageValue" => true,
        "value" => object.get("type").and_then(Value::as_str) == Some("Value"),
        _ => false,
    }
}

fn quantity_eq(desired: &Value, live: &Value) -> bool {
    let as_text = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match (as_text(desired), as_text(live)) {
        (Some(d), Some(l)) => {
            d == l
                || matches!(
                    (parse_quantity(&d), parse_quantity(&l)),
                    (Some(a), Some(b)) if (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
                )
        }
        _ => subset(desired, live, false),
    }
}

/// Parse a Kubernetes resource quantity into its numeric value.
///
/// Accepts binary suffixes (`Ki`..`Ei`), decimal suffixes (`n`, `u`, `m`,
/// `k`, `M`..`E`) and plain or exponent numbers (`1.5`, `1e3`).
pub fn parse_quantity(raw: &str) -> Option<f64> {
    const BINARY: [(&str, f64); 6] = [
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
    ];
    const DECIMAL: [(char, f64); 9] = [
        ('n', 1e-9),
        ('u', 1e-6),
        ('m', 1e-3),
        ('k', 1e3),
        ('M', 1e6),
        ('G', 1e9),
        ('T', 1e12),
        ('P', 1e15),
        ('E', 1e18),
    ];

    let raw = raw.trim();
    for (suffix, factor) in BINARY {
        if let Some(number) = raw.strip_suffix(suffix) {
            return parse_number(number).map(|n| n * factor);
        }
    }
    for (suffix, factor) in DECIMAL {
        if let Some(number) = raw.strip_suffix(suffix) {
            return parse_number(number).map(|n| n * factor);
        }
    }
    parse_number(raw)
}

fn parse_number(raw: &str) -> Option<f64> {
    if !raw.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}
