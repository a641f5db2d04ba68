//! InferenceService status types

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ConditionStatus};

/// Aggregate readiness condition
pub const READY: &str = "Ready";
/// Predictor Deployment (and workers) available
pub const PREDICTOR_READY: &str = "PredictorReady";
/// Transformer Deployment available
pub const TRANSFORMER_READY: &str = "TransformerReady";
/// Explainer Deployment available
pub const EXPLAINER_READY: &str = "ExplainerReady";
/// Routes accepted by their parents
pub const INGRESS_READY: &str = "IngressReady";

/// Observed state of an InferenceService
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceStatus {
    /// Readiness conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Externally visible URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Cluster-internal address of the entry component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,

    /// Per-component status keyed by component name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, ComponentStatus>,

    /// Model loading state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_status: Option<ModelStatus>,

    /// Generation last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Cluster-internal address
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Addressable {
    /// Address URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Status of one component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Component URL, set once the component is available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Latest Deployment revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_created_revision: Option<String>,
}

/// Model transition state
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TransitionStatus {
    /// Waiting for the entry Deployment to become available
    #[default]
    InProgress,
    /// Model is being served
    UpToDate,
    /// Rollout failed
    BlockedByFailedLoad,
}

/// Per-revision model state
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ModelState {
    /// Not scheduled yet
    #[default]
    Pending,
    /// Starting up
    Loading,
    /// Serving
    Loaded,
    /// Failed to start
    FailedToLoad,
}

/// Model revision states
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelRevisionStates {
    /// State of the model currently serving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_model_state: Option<ModelState>,
    /// State of the model being rolled out
    pub target_model_state: ModelState,
}

/// Details of the last rollout failure
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct FailureInfo {
    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

/// Model status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    /// Transition status
    pub transition_status: TransitionStatus,
    /// Revision states
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_revision_states: Option<ModelRevisionStates>,
    /// Last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_info: Option<FailureInfo>,
}

impl InferenceServiceStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Whether the condition exists and is True
    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.condition(type_).is_some_and(Condition::is_true)
    }

    /// Insert or replace a condition.
    ///
    /// The previous transition time is kept when the status is unchanged.
    pub fn set_condition(&mut self, mut condition: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }

    /// Remove a condition by type
    pub fn remove_condition(&mut self, type_: &str) {
        self.conditions.retain(|c| c.type_ != type_);
    }

    /// Set `Ready` to the AND of every other condition present
    pub fn compute_ready(&mut self) {
        let others: Vec<&Condition> = self
            .conditions
            .iter()
            .filter(|c| c.type_ != READY)
            .collect();
        let first_not_ready = others.iter().find(|c| !c.is_true());
        let ready = match first_not_ready {
            None if !others.is_empty() => Condition::new(READY, ConditionStatus::True, "", ""),
            None => Condition::new(READY, ConditionStatus::Unknown, "", ""),
            Some(c) => Condition::new(
                READY,
                if c.status == ConditionStatus::Unknown {
                    ConditionStatus::Unknown
                } else {
                    ConditionStatus::False
                },
                c.reason.clone(),
                c.message.clone(),
            ),
        };
        self.set_condition(ready);
    }

    /// Equal apart from condition timestamps
    pub fn same_state(&self, other: &InferenceServiceStatus) -> bool {
        self.url == other.url
            && self.address == other.address
            && self.components == other.components
            && self.model_status == other.model_status
            && self.observed_generation == other.observed_generation
            && self.conditions.len() == other.conditions.len()
            && self.conditions.iter().all(|c| {
                other
                    .condition(&c.type_)
                    .is_some_and(|o| c.same_state(o))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(type_: &str, status: ConditionStatus) -> Condition {
        Condition::new(type_, status, "", "")
    }

    #[test]
    fn set_condition_keeps_transition_time_when_status_unchanged() {
        let mut status = InferenceServiceStatus::default();
        let mut first = cond(PREDICTOR_READY, ConditionStatus::True);
        first.last_transition_time = first.last_transition_time - chrono::Duration::minutes(5);
        let original = first.last_transition_time;
        status.set_condition(first);

        status.set_condition(cond(PREDICTOR_READY, ConditionStatus::True));
        assert_eq!(
            status.condition(PREDICTOR_READY).unwrap().last_transition_time,
            original
        );

        status.set_condition(cond(PREDICTOR_READY, ConditionStatus::False));
        assert_ne!(
            status.condition(PREDICTOR_READY).unwrap().last_transition_time,
            original
        );
    }

    /// Story: Ready is the AND of the conditions present
    #[test]
    fn story_ready_is_and_of_present_conditions() {
        let mut status = InferenceServiceStatus::default();
        status.set_condition(cond(PREDICTOR_READY, ConditionStatus::True));
        status.set_condition(cond(INGRESS_READY, ConditionStatus::True));
        status.compute_ready();
        assert!(status.is_condition_true(READY));
        assert!(status.condition(TRANSFORMER_READY).is_none());

        status.set_condition(Condition::new(
            INGRESS_READY,
            ConditionStatus::False,
            "NotAccepted",
            "gateway rejected route",
        ));
        status.compute_ready();
        let ready = status.condition(READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "NotAccepted");
    }

    #[test]
    fn ready_is_unknown_without_inputs() {
        let mut status = InferenceServiceStatus::default();
        status.compute_ready();
        assert_eq!(status.condition(READY).unwrap().status, ConditionStatus::Unknown);
    }

    #[test]
    fn same_state_ignores_timestamps() {
        let mut a = InferenceServiceStatus::default();
        a.set_condition(cond(READY, ConditionStatus::True));
        let mut b = a.clone();
        b.conditions[0].last_transition_time =
            a.conditions[0].last_transition_time - chrono::Duration::seconds(30);
        assert!(a.same_state(&b));
        b.url = Some("http://raw-foo-default.example.com".to_string());
        assert!(!a.same_state(&b));
    }
}
