//! Deployment construction for a single component

use std::collections::BTreeMap;

use kserve_common::constants::{
    app_label_value, APP_LABEL, COMPONENT_LABEL, DEFAULT_CONTAINER_PORT, ISVC_LABEL,
    SEEDED_MIN_REPLICAS_ANNOTATION,
};
use kserve_common::crd::{ContainerSpec, DeploymentStrategy as StrategyOverride};
use kserve_common::kube_utils::ObjectMeta;

use super::WorkloadInput;
use crate::k8s::{
    Container, Deployment, DeploymentSpec, DeploymentStrategy, LabelSelector, PodMeta, PodSpec,
    PodTemplateSpec, Probe, RollingUpdateConfig, TcpSocketAction,
};

const REVISION_HISTORY_LIMIT: i32 = 10;
const PROGRESS_DEADLINE_SECONDS: i32 = 600;
const IMAGE_PULL_POLICY: &str = "IfNotPresent";
const TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";
const TERMINATION_MESSAGE_POLICY: &str = "File";

/// Rollout parameters used when the component does not override them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RolloutDefaults {
    /// 25% unavailable, 25% surge
    Standard,
    /// Bring up every replacement before tearing down: 0% unavailable, 100% surge
    Worker,
}

impl RolloutDefaults {
    fn params(&self) -> (&'static str, &'static str) {
        match self {
            Self::Standard => ("25%", "25%"),
            Self::Worker => ("0%", "100%"),
        }
    }
}

/// Replica state read back from a live Deployment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveReplicas {
    /// `spec.replicas` of the live object
    pub replicas: Option<i32>,
    /// MinReplicas recorded when the replica count was last seeded
    pub seeded_min: Option<i32>,
}

impl LiveReplicas {
    /// Extract replica state from a live Deployment's JSON
    pub fn from_json(live: &serde_json::Value) -> Self {
        Self {
            replicas: live
                .pointer("/spec/replicas")
                .and_then(|v| v.as_i64())
                .and_then(|v| i32::try_from(v).ok()),
            seeded_min: live
                .pointer("/metadata/annotations")
                .and_then(|a| a.get(SEEDED_MIN_REPLICAS_ANNOTATION))
                .and_then(|v| v.as_str())
                .and_then(|v| v.parse().ok()),
        }
    }
}

/// Replica count to write on a Deployment.
///
/// `None` when an autoscaler owns the count. Otherwise MinReplicas seeds the
/// count on creation and whenever MinReplicas changes; in between, the live
/// count is carried forward so out-of-band scaling survives unrelated updates.
pub fn resolve_replicas(
    autoscaled: bool,
    min_replicas: i32,
    live: Option<&LiveReplicas>,
) -> Option<i32> {
    if autoscaled {
        return None;
    }
    match live {
        Some(live) if live.seeded_min == Some(min_replicas) => {
            Some(live.replicas.unwrap_or(min_replicas))
        }
        _ => Some(min_replicas),
    }
}

/// Build the Deployment for a component
pub(crate) fn build_deployment(input: &WorkloadInput<'_>) -> Deployment {
    let app = app_label_value(&input.name);

    let mut selector = BTreeMap::new();
    selector.insert(APP_LABEL.to_string(), app.clone());

    let mut pod_labels = input.labels.clone();
    pod_labels.insert(APP_LABEL.to_string(), app);
    pod_labels.insert(ISVC_LABEL.to_string(), input.isvc_name.to_string());
    pod_labels.insert(
        COMPONENT_LABEL.to_string(),
        input.component.as_str().to_string(),
    );

    let mut metadata = ObjectMeta::new(&input.name, input.namespace)
        .with_labels(&pod_labels)
        .with_annotations(&input.annotations)
        .with_owner(input.owner.clone());
    if input.replicas.is_some() {
        metadata = metadata.with_annotation(
            SEEDED_MIN_REPLICAS_ANNOTATION,
            input.min_replicas.to_string(),
        );
    }

    let containers = input
        .containers
        .iter()
        .enumerate()
        .map(|(i, spec)| build_container(spec, i == 0, input.main_container_name))
        .collect();

    Deployment::new(
        metadata,
        DeploymentSpec {
            replicas: input.replicas,
            selector: LabelSelector {
                match_labels: selector,
            },
            template: PodTemplateSpec {
                metadata: PodMeta {
                    labels: pod_labels,
                    annotations: input.pod_annotations.clone(),
                },
                spec: PodSpec {
                    containers,
                    service_account_name: input.service_account_name.clone(),
                },
            },
            strategy: compile_strategy(input.strategy, input.rollout),
            revision_history_limit: REVISION_HISTORY_LIMIT,
            progress_deadline_seconds: PROGRESS_DEADLINE_SECONDS,
        },
    )
}

/// Rollout strategy: the component override when set, else the defaults
fn compile_strategy(
    strategy: Option<&StrategyOverride>,
    defaults: RolloutDefaults,
) -> DeploymentStrategy {
    let (default_unavailable, default_surge) = defaults.params();
    match strategy {
        Some(s) if s.type_.as_deref() == Some("Recreate") => DeploymentStrategy {
            type_: "Recreate".to_string(),
            rolling_update: None,
        },
        Some(s) => {
            let rolling = s.rolling_update.as_ref();
            DeploymentStrategy {
                type_: "RollingUpdate".to_string(),
                rolling_update: Some(RollingUpdateConfig {
                    max_unavailable: rolling
                        .and_then(|r| r.max_unavailable.clone())
                        .unwrap_or_else(|| default_unavailable.to_string()),
                    max_surge: rolling
                        .and_then(|r| r.max_surge.clone())
                        .unwrap_or_else(|| default_surge.to_string()),
                }),
            }
        }
        None => DeploymentStrategy {
            type_: "RollingUpdate".to_string(),
            rolling_update: Some(RollingUpdateConfig {
                max_unavailable: default_unavailable.to_string(),
                max_surge: default_surge.to_string(),
            }),
        },
    }
}

/// Build a pod container. The first container gets the main name and a
/// TCP readiness probe on its serving port.
fn build_container(spec: &ContainerSpec, is_main: bool, main_name: &str) -> Container {
    let name = if is_main {
        main_name.to_string()
    } else {
        spec.name.clone()
    };
    let readiness_probe = is_main.then(|| tcp_probe(serving_port(spec)));

    Container {
        name,
        image: spec.image.clone(),
        image_pull_policy: IMAGE_PULL_POLICY.to_string(),
        command: spec.command.clone(),
        args: spec.args.clone(),
        env: spec.env.clone(),
        ports: spec.ports.clone(),
        resources: spec.resources.clone(),
        readiness_probe,
        termination_message_path: TERMINATION_MESSAGE_PATH.to_string(),
        termination_message_policy: TERMINATION_MESSAGE_POLICY.to_string(),
    }
}

/// First declared port of a container, else the default serving port
pub fn serving_port(spec: &ContainerSpec) -> i32 {
    spec.ports
        .first()
        .map(|p| p.container_port)
        .unwrap_or(DEFAULT_CONTAINER_PORT)
}

fn tcp_probe(port: i32) -> Probe {
    Probe {
        tcp_socket: Some(TcpSocketAction { port }),
        timeout_seconds: 1,
        period_seconds: 10,
        success_threshold: 1,
        failure_threshold: 3,
    }
}
