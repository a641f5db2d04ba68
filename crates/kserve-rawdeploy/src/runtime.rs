//! ServingRuntime resolution for predictors with a model
//!
//! A predictor that declares a `model` is served by a ServingRuntime: the
//! one named explicitly, else the auto-selectable runtime supporting the
//! model format with the highest priority. The runtime's first container
//! becomes the predictor's main container, with the model's args, env and
//! resources layered on top.

use std::collections::BTreeMap;

use kserve_common::constants::{
    MAIN_CONTAINER_NAME, STORAGE_URI_ANNOTATION, STORAGE_URI_ENV,
};
use kserve_common::crd::{
    ContainerSpec, EnvVar, ModelSpec, PredictorSpec, RuntimeWorkerSpec, ServingRuntime,
};
use kserve_common::Error;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::IsvcKubeClient;

/// Predictor containers after runtime resolution
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedPredictor {
    /// Pod containers, main container first
    pub containers: Vec<ContainerSpec>,
    /// Pod template annotations (storage URI)
    pub pod_annotations: BTreeMap<String, String>,
    /// Multi-node defaults declared by the runtime
    pub runtime_worker: Option<RuntimeWorkerSpec>,
    /// Name of the runtime used, if any
    pub runtime_name: Option<String>,
}

/// Resolve the predictor's containers, reading ServingRuntimes when a model is set
pub async fn resolve_predictor(
    kube: &dyn IsvcKubeClient,
    isvc_name: &str,
    namespace: &str,
    predictor: &PredictorSpec,
) -> Result<ResolvedPredictor, Error> {
    let Some(model) = predictor.model.as_ref() else {
        return resolve_without_model(isvc_name, predictor);
    };

    let runtime = match model.runtime.as_deref() {
        Some(name) => {
            let runtime = kube
                .get_serving_runtime(namespace, name)
                .await?
                .ok_or_else(|| {
                    Error::dependency_not_ready(
                        isvc_name,
                        format!("ServingRuntime {name} not found in namespace {namespace}"),
                    )
                })?;
            check_explicit_runtime(isvc_name, model, &runtime)?;
            runtime
        }
        None => {
            let candidates = kube.list_serving_runtimes(namespace).await?;
            select_runtime(model, &candidates)
                .cloned()
                .ok_or_else(|| {
                    Error::dependency_not_ready(
                        isvc_name,
                        format!(
                            "no runtime found to support model format {}",
                            model.model_format.name
                        ),
                    )
                })?
        }
    };

    info!(runtime = %runtime.name_any(), format = %model.model_format.name, "resolved serving runtime");
    merge_runtime(isvc_name, predictor, model, &runtime)
}

fn resolve_without_model(
    isvc_name: &str,
    predictor: &PredictorSpec,
) -> Result<ResolvedPredictor, Error> {
    if predictor.component.containers.is_empty() {
        return Err(Error::validation_for_field(
            isvc_name,
            "spec.predictor",
            "predictor must declare a model or at least one container",
        ));
    }
    Ok(ResolvedPredictor {
        containers: predictor.component.containers.clone(),
        ..Default::default()
    })
}

/// An explicitly named runtime must be enabled and support the model format
fn check_explicit_runtime(
    isvc_name: &str,
    model: &ModelSpec,
    runtime: &ServingRuntime,
) -> Result<(), Error> {
    let name = runtime.name_any();
    if runtime.spec.is_disabled() {
        return Err(Error::validation_for_field(
            isvc_name,
            "spec.predictor.model.runtime",
            format!("ServingRuntime {name} is disabled"),
        ));
    }
    let format = &model.model_format;
    if runtime
        .spec
        .supports(&format.name, format.version.as_deref())
        .is_none()
    {
        return Err(Error::validation_for_field(
            isvc_name,
            "spec.predictor.model.runtime",
            format!("ServingRuntime {name} does not support model format {}", format.name),
        ));
    }
    Ok(())
}

/// Highest-priority enabled auto-selectable runtime supporting the format.
///
/// Ties keep list order; a missing priority ranks below any explicit one.
pub fn select_runtime<'a>(
    model: &ModelSpec,
    candidates: &'a [ServingRuntime],
) -> Option<&'a ServingRuntime> {
    let format = &model.model_format;
    let mut best: Option<(&ServingRuntime, Option<i32>)> = None;
    for runtime in candidates.iter().filter(|r| !r.spec.is_disabled()) {
        let Some(supported) = runtime
            .spec
            .supports(&format.name, format.version.as_deref())
        else {
            continue;
        };
        if !supported.auto_select.unwrap_or(false) {
            continue;
        }
        match best {
            Some((_, priority)) if priority >= supported.priority => {}
            _ => best = Some((runtime, supported.priority)),
        }
    }
    best.map(|(runtime, _)| runtime)
}

/// Build predictor containers from the runtime and the model
pub fn merge_runtime(
    isvc_name: &str,
    predictor: &PredictorSpec,
    model: &ModelSpec,
    runtime: &ServingRuntime,
) -> Result<ResolvedPredictor, Error> {
    let storage_uri = model.storage_uri.as_deref().ok_or_else(|| {
        Error::dependency_not_ready(isvc_name, "model storageUri is not set")
    })?;

    let mut runtime_containers = runtime.spec.containers.iter();
    let mut main = runtime_containers.next().cloned().ok_or_else(|| {
        Error::validation_for(
            isvc_name,
            format!("ServingRuntime {} declares no containers", runtime.name_any()),
        )
    })?;
    main.name = MAIN_CONTAINER_NAME.to_string();

    let mut overrides = predictor.component.containers.iter();
    if let Some(first) = overrides.next() {
        overlay(&mut main, first);
    }
    main.args.extend(model.args.iter().cloned());
    merge_env(&mut main.env, &model.env);
    merge_env(
        &mut main.env,
        &[EnvVar::new(STORAGE_URI_ENV, storage_uri)],
    );
    main.resources
        .limits
        .extend(model.resources.limits.clone());
    main.resources
        .requests
        .extend(model.resources.requests.clone());

    let mut containers = vec![main];
    containers.extend(runtime_containers.cloned());
    containers.extend(overrides.cloned());

    let mut pod_annotations = BTreeMap::new();
    pod_annotations.insert(STORAGE_URI_ANNOTATION.to_string(), storage_uri.to_string());

    debug!(containers = containers.len(), "merged runtime containers");
    Ok(ResolvedPredictor {
        containers,
        pod_annotations,
        runtime_worker: runtime.spec.worker_spec.clone(),
        runtime_name: Some(runtime.name_any()),
    })
}

/// Apply a user container override onto a runtime container
fn overlay(base: &mut ContainerSpec, user: &ContainerSpec) {
    if !user.image.is_empty() {
        base.image = user.image.clone();
    }
    if !user.command.is_empty() {
        base.command = user.command.clone();
    }
    base.args.extend(user.args.iter().cloned());
    merge_env(&mut base.env, &user.env);
    if !user.ports.is_empty() {
        base.ports = user.ports.clone();
    }
    base.resources.limits.extend(user.resources.limits.clone());
    base.resources
        .requests
        .extend(user.resources.requests.clone());
}

fn merge_env(env: &mut Vec<EnvVar>, extra: &[EnvVar]) {
    for var in extra {
        match env.iter_mut().find(|e| e.name == var.name) {
            Some(existing) => existing.value = var.value.clone(),
            None => env.push(var.clone()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
