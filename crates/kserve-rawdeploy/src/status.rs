//! Status aggregation
//!
//! Component readiness comes from the live Deployments; ingress readiness from
//! the route outcome. The aggregator folds these into conditions, URLs,
//! component status and model status, then computes `Ready` as the AND of the
//! conditions present. Absent components contribute no condition.

use k8s_openapi::api::apps::v1::DeploymentCondition;
use kserve_common::constants::{service_hostname, Component, DEPLOYMENT_REVISION_ANNOTATION};
use kserve_common::crd::{
    Addressable, ComponentStatus, Condition, ConditionStatus, FailureInfo, InferenceService,
    InferenceServiceStatus, ModelRevisionStates, ModelState, ModelStatus, TransitionStatus,
    INGRESS_READY,
};
use kserve_common::kube_utils::{
    condition_has_status, find_condition, CONDITION_AVAILABLE, CONDITION_PROGRESSING,
    CONDITION_REPLICA_FAILURE, STATUS_FALSE, STATUS_TRUE,
};
use serde_json::Value;

use crate::ingress::RouteHosts;

const PROGRESS_DEADLINE_EXCEEDED: &str = "ProgressDeadlineExceeded";

// =============================================================================
// Component state
// =============================================================================

/// Rollout state of a component Deployment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ComponentState {
    /// Deployment not observed yet
    #[default]
    Unknown,
    /// Rolling out
    Progressing {
        /// Condition reason
        reason: String,
        /// Condition message
        message: String,
    },
    /// Available
    Ready,
    /// Rollout failed
    Failed {
        /// Condition reason
        reason: String,
        /// Condition message
        message: String,
    },
}

impl ComponentState {
    /// Derive the state from a live Deployment's JSON
    pub fn from_deployment(live: Option<&Value>) -> Self {
        let Some(live) = live else {
            return Self::Unknown;
        };
        let conditions: Vec<DeploymentCondition> = match live.pointer("/status/conditions") {
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(conditions) => conditions,
                Err(_) => return Self::Unknown,
            },
            None => Vec::new(),
        };

        if let Some(failure) = find_condition(&conditions, CONDITION_REPLICA_FAILURE)
            .filter(|c| c.status == STATUS_TRUE)
        {
            return Self::Failed {
                reason: failure.reason.clone().unwrap_or_default(),
                message: failure.message.clone().unwrap_or_default(),
            };
        }
        if let Some(stalled) = find_condition(&conditions, CONDITION_PROGRESSING).filter(|c| {
            c.status == STATUS_FALSE && c.reason.as_deref() == Some(PROGRESS_DEADLINE_EXCEEDED)
        }) {
            return Self::Failed {
                reason: PROGRESS_DEADLINE_EXCEEDED.to_string(),
                message: stalled.message.clone().unwrap_or_default(),
            };
        }
        if condition_has_status(&conditions, CONDITION_AVAILABLE, STATUS_TRUE) {
            return Self::Ready;
        }
        match find_condition(&conditions, CONDITION_AVAILABLE) {
            Some(c) => Self::Progressing {
                reason: c.reason.clone().unwrap_or_default(),
                message: c.message.clone().unwrap_or_default(),
            },
            None => Self::Progressing {
                reason: "DeploymentProgressing".to_string(),
                message: "Deployment has not reported availability".to_string(),
            },
        }
    }

    /// The less ready of two states (head and worker Deployments)
    pub fn combine(self, other: Self) -> Self {
        fn rank(s: &ComponentState) -> u8 {
            match s {
                ComponentState::Failed { .. } => 0,
                ComponentState::Unknown => 1,
                ComponentState::Progressing { .. } => 2,
                ComponentState::Ready => 3,
            }
        }
        if rank(&other) < rank(&self) {
            other
        } else {
            self
        }
    }

    /// Whether the component is serving
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Condition reported for a component
    pub fn condition(&self, type_: &str) -> Condition {
        match self {
            Self::Unknown => Condition::new(
                type_,
                ConditionStatus::Unknown,
                "DeploymentNotObserved",
                "Deployment status is not available yet",
            ),
            Self::Progressing { reason, message } => {
                Condition::new(type_, ConditionStatus::False, reason.clone(), message.clone())
            }
            Self::Ready => Condition::new(type_, ConditionStatus::True, "", ""),
            Self::Failed { reason, message } => {
                Condition::new(type_, ConditionStatus::False, reason.clone(), message.clone())
            }
        }
    }
}

/// Revision recorded on a live Deployment
pub fn deployment_revision(live: Option<&Value>) -> Option<String> {
    live?
        .pointer("/metadata/annotations")?
        .get(DEPLOYMENT_REVISION_ANNOTATION)?
        .as_str()
        .map(str::to_string)
}

// =============================================================================
// Aggregation
// =============================================================================

/// Observed outcome for one component
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentObservation {
    /// Component
    pub component: Component,
    /// Rollout state (head and workers combined)
    pub state: ComponentState,
    /// Latest Deployment revision
    pub revision: Option<String>,
}

/// Observed outcome of route reconciliation
#[derive(Clone, Debug, PartialEq)]
pub enum IngressObservation {
    /// Routes accepted, or none required
    Ready,
    /// Routes not created or not accepted yet
    NotReady {
        /// Condition reason
        reason: String,
        /// Condition message
        message: String,
    },
}

/// Inputs of the status aggregator
#[derive(Clone, Debug)]
pub struct StatusInput<'a> {
    /// InferenceService
    pub isvc: &'a InferenceService,
    /// InferenceService name
    pub isvc_name: &'a str,
    /// Namespace
    pub namespace: &'a str,
    /// Resolved route hosts, absent when host resolution failed
    pub hosts: Option<&'a RouteHosts>,
    /// URL scheme from the ingress config
    pub url_scheme: &'a str,
    /// Whether the service is exposed outside the cluster
    pub external: bool,
    /// Component whose Service receives traffic
    pub entry: Component,
    /// Per-component outcomes, in reconcile order
    pub components: &'a [ComponentObservation],
    /// Route outcome
    pub ingress: IngressObservation,
}

/// Builds InferenceService status from observations
pub struct StatusAggregator;

impl StatusAggregator {
    /// Fold observations into a new status based on the previous one
    pub fn aggregate(
        previous: &InferenceServiceStatus,
        input: &StatusInput<'_>,
    ) -> InferenceServiceStatus {
        let mut status = previous.clone();

        for component in Component::ALL {
            if !input.isvc.spec.has_component(component) {
                status.remove_condition(component.ready_condition());
                status.components.remove(component.as_str());
            }
        }

        for observed in input.components {
            status.set_condition(observed.state.condition(observed.component.ready_condition()));
            status.components.insert(
                observed.component.as_str().to_string(),
                ComponentStatus {
                    url: observed
                        .state
                        .is_ready()
                        .then(|| component_url(input, observed.component))
                        .flatten(),
                    latest_created_revision: observed.revision.clone(),
                },
            );
        }

        status.set_condition(match &input.ingress {
            IngressObservation::Ready => Condition::new(INGRESS_READY, ConditionStatus::True, "", ""),
            IngressObservation::NotReady { reason, message } => Condition::new(
                INGRESS_READY,
                ConditionStatus::False,
                reason.clone(),
                message.clone(),
            ),
        });

        let entry_host = service_hostname(&input.entry.object_name(input.isvc_name), input.namespace);
        status.url = if input.external {
            input
                .hosts
                .map(|hosts| format!("{}://{}", input.url_scheme, hosts.top_level))
                .or_else(|| status.url.clone())
        } else {
            Some(format!("http://{entry_host}"))
        };
        status.address = Some(Addressable {
            url: Some(format!("{}://{entry_host}", input.url_scheme)),
        });

        status.model_status = input
            .components
            .iter()
            .find(|c| c.component == input.entry)
            .map(|c| model_status(&c.state));
        status.observed_generation = input.isvc.metadata.generation;
        status.compute_ready();
        status
    }
}

fn component_url(input: &StatusInput<'_>, component: Component) -> Option<String> {
    if input.external {
        input
            .hosts?
            .component(component)
            .map(|host| format!("{}://{}", input.url_scheme, host))
    } else {
        Some(format!(
            "http://{}",
            service_hostname(
                &component.object_name(input.isvc_name),
                input.namespace
            )
        ))
    }
}

fn model_status(state: &ComponentState) -> ModelStatus {
    match state {
        ComponentState::Ready => ModelStatus {
            transition_status: TransitionStatus::UpToDate,
            model_revision_states: Some(ModelRevisionStates {
                active_model_state: Some(ModelState::Loaded),
                target_model_state: ModelState::Loaded,
            }),
            last_failure_info: None,
        },
        ComponentState::Failed { reason, message } => ModelStatus {
            transition_status: TransitionStatus::BlockedByFailedLoad,
            model_revision_states: Some(ModelRevisionStates {
                active_model_state: None,
                target_model_state: ModelState::FailedToLoad,
            }),
            last_failure_info: Some(FailureInfo {
                reason: reason.clone(),
                message: message.clone(),
            }),
        },
        ComponentState::Progressing { .. } => ModelStatus {
            transition_status: TransitionStatus::InProgress,
            model_revision_states: Some(ModelRevisionStates {
                active_model_state: None,
                target_model_state: ModelState::Loading,
            }),
            last_failure_info: None,
        },
        ComponentState::Unknown => ModelStatus {
            transition_status: TransitionStatus::InProgress,
            model_revision_states: Some(ModelRevisionStates {
                active_model_state: None,
                target_model_state: ModelState::Pending,
            }),
            last_failure_info: None,
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
