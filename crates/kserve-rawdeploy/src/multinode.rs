//! Multi-node worker expansion
//!
//! A predictor with a `workerSpec` runs as a head Deployment (the ordinary
//! predictor Deployment) plus a worker Deployment with
//! `pipelineParallelSize - 1` replicas. Both get the parallelism sizes as env
//! and one GPU per tensor-parallel rank on their main container. Workers find
//! the head through a headless Service scoped to the InferenceService
//! generation.

use kserve_common::constants::{
    head_service_name, worker_name, Component, GPU_RESOURCE_TYPES, NVIDIA_GPU_RESOURCE,
    PIPELINE_PARALLEL_SIZE_ENV, TENSOR_PARALLEL_SIZE_ENV, WORKER_CONTAINER_NAME,
};
use kserve_common::crd::{
    ContainerSpec, EnvVar, ResourceRequirements, RuntimeWorkerSpec, WorkerSpec,
};
use tracing::debug;

use crate::k8s::{Deployment, Service};
use crate::workload::{
    compile_head_service, serving_port, RolloutDefaults, WorkloadCompiler, WorkloadInput,
};

// =============================================================================
// Sizes
// =============================================================================

/// Effective tensor and pipeline parallel sizes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelSizes {
    /// GPUs per node
    pub tensor: i32,
    /// Nodes, head included
    pub pipeline: i32,
}

impl ParallelSizes {
    /// Spec value if set, else the runtime default, else 1
    pub fn resolve(spec: &WorkerSpec, runtime: Option<&RuntimeWorkerSpec>) -> Self {
        let pick = |own: Option<i32>, fallback: Option<i32>| own.or(fallback).unwrap_or(1).max(1);
        Self {
            tensor: pick(
                spec.tensor_parallel_size,
                runtime.and_then(|r| r.tensor_parallel_size),
            ),
            pipeline: pick(
                spec.pipeline_parallel_size,
                runtime.and_then(|r| r.pipeline_parallel_size),
            ),
        }
    }

    /// Worker Deployment replicas
    pub fn worker_replicas(&self) -> i32 {
        self.pipeline - 1
    }
}

/// GPU resource name already declared on the container, else NVIDIA
pub fn gpu_resource_type(resources: &ResourceRequirements) -> &'static str {
    GPU_RESOURCE_TYPES
        .iter()
        .copied()
        .find(|gpu| resources.limits.contains_key(*gpu) || resources.requests.contains_key(*gpu))
        .unwrap_or(NVIDIA_GPU_RESOURCE)
}

/// Set the parallelism env vars and GPU quantities on a container
pub fn inject_parallelism(container: &mut ContainerSpec, sizes: ParallelSizes) {
    set_env(container, PIPELINE_PARALLEL_SIZE_ENV, sizes.pipeline.to_string());
    set_env(container, TENSOR_PARALLEL_SIZE_ENV, sizes.tensor.to_string());

    let gpu = gpu_resource_type(&container.resources);
    let quantity = sizes.tensor.to_string();
    container
        .resources
        .limits
        .insert(gpu.to_string(), quantity.clone());
    container.resources.requests.insert(gpu.to_string(), quantity);
}

fn set_env(container: &mut ContainerSpec, name: &str, value: String) {
    match container.env.iter_mut().find(|e| e.name == name) {
        Some(existing) => existing.value = value,
        None => container.env.push(EnvVar::new(name, value)),
    }
}

// =============================================================================
// Expansion
// =============================================================================

/// Worker objects generated for a multi-node predictor
#[derive(Clone, Debug)]
pub struct MultiNodeWorkloads {
    /// Effective sizes
    pub sizes: ParallelSizes,
    /// Worker Deployment
    pub worker: Deployment,
    /// Headless Service for head discovery
    pub head_service: Service,
}

/// Expands a predictor into head and worker workloads
pub struct MultiNodeExpander;

impl MultiNodeExpander {
    /// Inject parallelism into the head input and build the worker objects.
    ///
    /// Worker containers come from the InferenceService `workerSpec`, else
    /// from the runtime's worker defaults, else from the head's main container.
    pub fn expand(
        head: &mut WorkloadInput<'_>,
        spec: &WorkerSpec,
        runtime: Option<&RuntimeWorkerSpec>,
        generation: i64,
    ) -> MultiNodeWorkloads {
        let sizes = ParallelSizes::resolve(spec, runtime);

        if let Some(main) = head.containers.first_mut() {
            inject_parallelism(main, sizes);
        }

        let declared = if spec.containers.is_empty() {
            runtime.map(|r| r.containers.clone()).unwrap_or_default()
        } else {
            spec.containers.clone()
        };
        let worker_containers = if declared.is_empty() {
            head.containers.iter().take(1).cloned().collect()
        } else {
            let mut declared = declared;
            if let Some(main) = declared.first_mut() {
                inject_parallelism(main, sizes);
            }
            declared
        };

        let worker_input = WorkloadInput {
            name: worker_name(head.isvc_name),
            namespace: head.namespace,
            isvc_name: head.isvc_name,
            component: Component::Predictor,
            labels: head.labels.clone(),
            annotations: head.annotations.clone(),
            pod_annotations: head.pod_annotations.clone(),
            containers: worker_containers,
            main_container_name: WORKER_CONTAINER_NAME,
            service_account_name: head.service_account_name.clone(),
            replicas: Some(sizes.worker_replicas()),
            min_replicas: sizes.worker_replicas(),
            strategy: head.strategy,
            rollout: RolloutDefaults::Worker,
            owner: head.owner.clone(),
        };
        let worker = WorkloadCompiler::compile_deployment(&worker_input);

        let target_port = head
            .containers
            .first()
            .map(serving_port)
            .unwrap_or(kserve_common::constants::DEFAULT_CONTAINER_PORT);
        let head_service = compile_head_service(
            &head_service_name(head.isvc_name, generation),
            head.namespace,
            head.isvc_name,
            &head.name,
            generation,
            target_port,
            head.owner.clone(),
        );

        debug!(
            isvc = %head.isvc_name,
            tensor = sizes.tensor,
            pipeline = sizes.pipeline,
            "expanded multi-node predictor"
        );

        MultiNodeWorkloads {
            sizes,
            worker,
            head_service,
        }
    }
}

/// Head Services from older generations that should be deleted
pub fn stale_head_services(live: &[String], current: &str) -> Vec<String> {
    live.iter()
        .filter(|name| name.as_str() != current)
        .cloned()
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use kserve_common::constants::{HEAD_SVC_GENERATION_LABEL, MAIN_CONTAINER_NAME};

    fn head_input() -> WorkloadInput<'static> {
        WorkloadInput {
            name: "raw-foo-predictor".to_string(),
            namespace: "default",
            isvc_name: "raw-foo",
            component: Component::Predictor,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            pod_annotations: BTreeMap::new(),
            containers: vec![ContainerSpec {
                image: "kserve/huggingfaceserver:latest".to_string(),
                ..Default::default()
            }],
            main_container_name: MAIN_CONTAINER_NAME,
            service_account_name: None,
            replicas: Some(1),
            min_replicas: 1,
            strategy: None,
            rollout: RolloutDefaults::Standard,
            owner: None,
        }
    }

    fn worker_container() -> ContainerSpec {
        ContainerSpec {
            image: "kserve/huggingfaceserver:latest".to_string(),
            ..Default::default()
        }
    }

    fn env<'a>(container: &'a crate::k8s::Container, name: &str) -> Option<&'a str> {
        container
            .env
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    // =========================================================================
    // Story: Pipeline-parallel predictor gets a worker Deployment
    // =========================================================================

    /// Story: pipelineParallelSize 3 yields two worker replicas
    #[test]
    fn story_worker_deployment_from_pipeline_size() {
        let mut head = head_input();
        let spec = WorkerSpec {
            pipeline_parallel_size: Some(3),
            containers: vec![worker_container()],
            ..Default::default()
        };
        let out = MultiNodeExpander::expand(&mut head, &spec, None, 1);

        assert_eq!(out.worker.metadata.name, "raw-foo-predictor-worker");
        assert_eq!(out.worker.spec.replicas, Some(2));

        let worker_main = &out.worker.spec.template.spec.containers[0];
        assert_eq!(worker_main.name, WORKER_CONTAINER_NAME);
        assert_eq!(env(worker_main, PIPELINE_PARALLEL_SIZE_ENV), Some("3"));
        assert_eq!(env(worker_main, TENSOR_PARALLEL_SIZE_ENV), Some("1"));

        let rolling = out.worker.spec.strategy.rolling_update.as_ref().unwrap();
        assert_eq!(rolling.max_unavailable, "0%");
        assert_eq!(rolling.max_surge, "100%");

        let head_env = &head.containers[0].env;
        assert!(head_env
            .iter()
            .any(|e| e.name == PIPELINE_PARALLEL_SIZE_ENV && e.value == "3"));
    }

    #[test]
    fn sizes_fall_back_to_runtime_then_one() {
        let runtime = RuntimeWorkerSpec {
            tensor_parallel_size: Some(4),
            pipeline_parallel_size: Some(2),
            containers: vec![],
        };
        let sizes = ParallelSizes::resolve(&WorkerSpec::default(), Some(&runtime));
        assert_eq!(sizes, ParallelSizes { tensor: 4, pipeline: 2 });

        let spec = WorkerSpec {
            tensor_parallel_size: Some(2),
            ..Default::default()
        };
        let sizes = ParallelSizes::resolve(&spec, None);
        assert_eq!(sizes, ParallelSizes { tensor: 2, pipeline: 1 });
        assert_eq!(sizes.worker_replicas(), 0);
    }

    #[test]
    fn gpu_quantity_matches_tensor_size() {
        let mut container = worker_container();
        container
            .resources
            .limits
            .insert("amd.com/gpu".to_string(), "1".to_string());
        inject_parallelism(
            &mut container,
            ParallelSizes {
                tensor: 4,
                pipeline: 2,
            },
        );
        assert_eq!(container.resources.limits["amd.com/gpu"], "4");
        assert_eq!(container.resources.requests["amd.com/gpu"], "4");
        assert!(!container.resources.limits.contains_key(NVIDIA_GPU_RESOURCE));

        let mut plain = worker_container();
        inject_parallelism(
            &mut plain,
            ParallelSizes {
                tensor: 2,
                pipeline: 2,
            },
        );
        assert_eq!(plain.resources.limits[NVIDIA_GPU_RESOURCE], "2");
    }

    #[test]
    fn runtime_worker_container_used_when_spec_has_none() {
        let runtime = RuntimeWorkerSpec {
            containers: vec![worker_container()],
            ..Default::default()
        };
        let mut head = head_input();
        let spec = WorkerSpec {
            pipeline_parallel_size: Some(2),
            ..Default::default()
        };
        let out = MultiNodeExpander::expand(&mut head, &spec, Some(&runtime), 4);
        assert_eq!(out.worker.spec.replicas, Some(1));
        assert_eq!(out.head_service.metadata.name, "raw-foo-predictor-head-4");
        assert_eq!(
            out.head_service.metadata.labels[HEAD_SVC_GENERATION_LABEL],
            "4"
        );
        assert_eq!(out.head_service.spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(out.head_service.spec.publish_not_ready_addresses, Some(true));
    }

    /// Story: a bare workerSpec reuses the head's main container for workers
    #[test]
    fn story_bare_worker_spec_clones_head_container() {
        let mut head = head_input();
        let spec = WorkerSpec {
            pipeline_parallel_size: Some(3),
            ..Default::default()
        };
        let out = MultiNodeExpander::expand(&mut head, &spec, None, 1);

        assert_eq!(out.worker.metadata.name, "raw-foo-predictor-worker");
        assert_eq!(out.worker.spec.replicas, Some(2));

        let containers = &out.worker.spec.template.spec.containers;
        assert_eq!(containers.len(), 1);
        let worker_main = &containers[0];
        assert_eq!(worker_main.name, WORKER_CONTAINER_NAME);
        assert_eq!(worker_main.image, "kserve/huggingfaceserver:latest");
        assert_eq!(env(worker_main, PIPELINE_PARALLEL_SIZE_ENV), Some("3"));
        assert_eq!(env(worker_main, TENSOR_PARALLEL_SIZE_ENV), Some("1"));
        assert_eq!(
            worker_main
                .env
                .iter()
                .filter(|e| e.name == PIPELINE_PARALLEL_SIZE_ENV)
                .count(),
            1
        );
    }

    #[test]
    fn only_other_generations_are_stale() {
        let live = vec![
            "raw-foo-predictor-head-1".to_string(),
            "raw-foo-predictor-head-2".to_string(),
        ];
        assert_eq!(
            stale_head_services(&live, "raw-foo-predictor-head-2"),
            vec!["raw-foo-predictor-head-1".to_string()]
        );
    }
}
