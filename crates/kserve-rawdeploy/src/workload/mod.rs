//! Resource builders for component workloads
//!
//! Each component compiles to one Deployment and one ClusterIP Service, both
//! named `{isvc}-{component}`. Builders are pure: live state they depend on
//! (the replica count) is resolved by the caller and passed in.

mod deployment;
mod service;

use std::collections::BTreeMap;

use kserve_common::constants::Component;
use kserve_common::crd::{ContainerSpec, DeploymentStrategy};
use kserve_common::kube_utils::OwnerReference;

pub use deployment::{resolve_replicas, serving_port, LiveReplicas, RolloutDefaults};
pub use service::compile_head_service;

use crate::k8s::{Deployment, Service};

/// Everything needed to build a component's workload objects
#[derive(Clone, Debug)]
pub struct WorkloadInput<'a> {
    /// Object name shared by the Deployment and Service
    pub name: String,
    /// Namespace
    pub namespace: &'a str,
    /// Owning InferenceService name
    pub isvc_name: &'a str,
    /// Component
    pub component: Component,
    /// Labels copied from the InferenceService
    pub labels: BTreeMap<String, String>,
    /// Propagated InferenceService annotations
    pub annotations: BTreeMap<String, String>,
    /// Extra pod template annotations (storage URI, sidecar injection)
    pub pod_annotations: BTreeMap<String, String>,
    /// Pod containers, main container first
    pub containers: Vec<ContainerSpec>,
    /// Name given to the first container
    pub main_container_name: &'a str,
    /// Pod service account
    pub service_account_name: Option<String>,
    /// Replica count; `None` leaves it to an autoscaler
    pub replicas: Option<i32>,
    /// MinReplicas recorded alongside a seeded replica count
    pub min_replicas: i32,
    /// Rollout override from the component spec
    pub strategy: Option<&'a DeploymentStrategy>,
    /// Rollout defaults
    pub rollout: RolloutDefaults,
    /// Controller owner reference
    pub owner: Option<OwnerReference>,
}

/// Workload objects generated for one component
#[derive(Clone, Debug)]
pub struct GeneratedWorkloads {
    /// Component Deployment
    pub deployment: Deployment,
    /// Component Service
    pub service: Service,
}

/// Compiles component workloads
pub struct WorkloadCompiler;

impl WorkloadCompiler {
    /// Build the Deployment and Service for a component
    pub fn compile(input: &WorkloadInput<'_>) -> GeneratedWorkloads {
        GeneratedWorkloads {
            deployment: deployment::build_deployment(input),
            service: service::compile_service(input),
        }
    }

    /// Build only a Deployment (used for multi-node workers)
    pub fn compile_deployment(input: &WorkloadInput<'_>) -> Deployment {
        deployment::build_deployment(input)
    }
}

// =============================================================================
// Tests
// =============================================================================
