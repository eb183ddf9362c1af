//! WASM entry points for browser use.
//!
//! Each entry point takes one JSON bundle: an in-memory store plus the
//! request. The result is `{"status":"success","result":...}` or
//! `{"status":"errors","errors":[...]}`.

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::collab::{Collaborators, Overrides};
use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::memory::InMemoryStore;
use crate::metadata::MetadataRequest;
use crate::resolve::PipelineResolver;

/// Ordered pipeline variables of the bundle's pipeline.
#[wasm_bindgen]
pub fn pipeline_variables(bundle_json: &str) -> JsValue {
    let result = Outcome::from(run(bundle_json, |resolver, bundle| {
        resolver.pipeline_variables(&bundle.app_id, &bundle.pipeline_id)
    }));
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// The bundle's pipeline with its stages resolved against `overrides`.
#[wasm_bindgen]
pub fn resolve_pipeline(bundle_json: &str) -> JsValue {
    let result = Outcome::from(run(bundle_json, resolve));
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// Aggregated deployment metadata of the bundle's pipeline.
#[wasm_bindgen]
pub fn deployment_metadata(bundle_json: &str) -> JsValue {
    let result = Outcome::from(run(bundle_json, metadata));
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

pub fn pipeline_variables_json(bundle_json: &str) -> String {
    to_json(Outcome::from(run(bundle_json, |resolver, bundle| {
        resolver.pipeline_variables(&bundle.app_id, &bundle.pipeline_id)
    })))
}

pub fn resolve_pipeline_json(bundle_json: &str) -> String {
    to_json(Outcome::from(run(bundle_json, resolve)))
}

pub fn deployment_metadata_json(bundle_json: &str) -> String {
    to_json(Outcome::from(run(bundle_json, metadata)))
}

fn resolve(resolver: &PipelineResolver<'_>, bundle: &Bundle) -> Result<crate::model::Pipeline> {
    resolver.read_pipeline_with_resolved_variables(
        &bundle.app_id,
        &bundle.pipeline_id,
        &bundle.overrides,
        bundle.pre_execution_checks,
    )
}

fn metadata(
    resolver: &PipelineResolver<'_>,
    bundle: &Bundle,
) -> Result<crate::model::DeploymentMetadata> {
    resolver.fetch_deployment_metadata(&bundle.app_id, &bundle.pipeline_id, &bundle.metadata)
}

fn run<T, F>(bundle_json: &str, f: F) -> Result<T>
where
    F: FnOnce(&PipelineResolver<'_>, &Bundle) -> Result<T>,
{
    let bundle: Bundle = serde_json::from_str(bundle_json)
        .map_err(|e| ResolveError::parse(format!("Failed to parse request bundle: {}", e)))?;
    let resolver = PipelineResolver::with_config(
        Collaborators::from_store(&bundle.store),
        bundle.config.clone(),
    );
    f(&resolver, &bundle)
}

fn to_json<T: Serialize>(outcome: Outcome<T>) -> String {
    serde_json::to_string(&outcome).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bundle {
    #[serde(default)]
    store: InMemoryStore,
    app_id: String,
    pipeline_id: String,
    #[serde(default)]
    overrides: Overrides,
    #[serde(default)]
    config: ResolverConfig,
    #[serde(default)]
    pre_execution_checks: bool,
    #[serde(default)]
    metadata: MetadataRequest,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
}

impl From<ResolveError> for ErrorDto {
    fn from(e: ResolveError) -> Self {
        ErrorDto {
            kind: e.kind.to_string(),
            message: e.message,
            stage: e.stage,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "status")]
enum Outcome<T> {
    #[serde(rename = "success")]
    Success { result: T },
    #[serde(rename = "errors")]
    Errors { errors: Vec<ErrorDto> },
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(result) => Outcome::Success { result },
            Err(e) => Outcome::Errors {
                errors: vec![ErrorDto::from(e)],
            },
        }
    }
}
