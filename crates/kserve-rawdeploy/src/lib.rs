//! RawDeployment topology and controller for KServe InferenceServices
//!
//! This crate turns an InferenceService into plain Kubernetes objects:
//!
//! - **Workload**: Deployments and Services per component
//! - **Autoscaler**: HPA, KEDA ScaledObject and OpenTelemetry collector selection
//! - **Multi-node**: worker Deployment and head Service for parallel predictors
//! - **Ingress**: Gateway API HTTPRoutes or a classic Ingress
//! - **Status**: condition, URL and model status aggregation
//! - **Controller**: the reconcile loop tying the above together

pub mod autoscaler;
pub mod component;
pub mod controller;
pub mod ingress;
pub mod k8s;
pub mod multinode;
pub mod runtime;
pub mod status;
pub mod workload;

pub use controller::{error_policy, reconcile, Context, DiscoveredCrds};
