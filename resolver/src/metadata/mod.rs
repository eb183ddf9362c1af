//! Deployment metadata aggregation across the enabled stages of a pipeline.

use serde::{Deserialize, Serialize};

use crate::collab::{Collaborators, Overrides};
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::model::{
    ArtifactVariable, DeploymentMetadata, Include, ManifestVariable, Pipeline, RequiredEntity,
};
use crate::walk::{walk, LoadMode, StageVisitor, WalkOptions, WorkflowCache, WorkflowVisit};

/// Inputs of a metadata request besides the pipeline itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataRequest {
    /// Pipeline variable values applied before the metadata walk.
    pub pipeline_variables: Overrides,
    /// Services already known to need an artifact. Seeds the result.
    pub service_hints: Vec<String>,
    /// Environments already known to be required. Seeds the result.
    pub env_hints: Vec<String>,
    pub with_default_artifact: bool,
    /// Empty means every slice.
    pub include: Vec<Include>,
}

/// Walk enabled stages and merge each workflow's metadata into one result.
pub fn aggregate(
    pipeline: &Pipeline,
    collab: Collaborators<'_>,
    config: &ResolverConfig,
    request: &MetadataRequest,
) -> Result<DeploymentMetadata> {
    let mut pipeline = pipeline.clone();
    let mut cache = WorkflowCache::new(
        collab.workflows,
        pipeline.app_id.clone(),
        LoadMode::WithoutServices,
    );
    let mut visitor = MetadataVisitor {
        collab,
        config,
        with_default_artifact: request.with_default_artifact,
        include: Include::normalize(&request.include),
        build_pipeline: false,
        result: DeploymentMetadata {
            artifact_required_service_ids: request.service_hints.clone(),
            env_ids: request.env_hints.clone(),
            ..Default::default()
        },
    };
    walk(&mut pipeline, &mut cache, WalkOptions::strict(), &mut visitor)?;
    Ok(visitor.result)
}

struct MetadataVisitor<'r> {
    collab: Collaborators<'r>,
    config: &'r ResolverConfig,
    with_default_artifact: bool,
    include: Vec<Include>,
    build_pipeline: bool,
    result: DeploymentMetadata,
}

impl StageVisitor for MetadataVisitor<'_> {
    fn workflow_stage(&mut self, visit: WorkflowVisit<'_>) -> Result<Option<String>> {
        let workflow = visit.workflow;

        // Build pipelines produce their artifacts, so nothing artifact
        // related is gathered from the first build stage on.
        if !self.build_pipeline && workflow.is_build() {
            tracing::debug!(
                "Stage {} runs build workflow {}, dropping artifact metadata",
                visit.stage.name,
                workflow.id
            );
            self.build_pipeline = true;
            self.result.artifact_variables.clear();
            self.include.retain(|i| *i != Include::ArtifactService);
        }
        if self.include.is_empty() {
            return Ok(None);
        }

        let fetched = self.collab.workflows.fetch_deployment_metadata(
            workflow,
            &visit.element.workflow_variables,
            self.with_default_artifact,
            &self.include,
        )?;
        let Some(fetched) = fetched else {
            return Ok(None);
        };

        merge_unique(
            &mut self.result.artifact_required_service_ids,
            fetched.artifact_required_service_ids,
        );
        merge_unique(
            &mut self.result.manifest_required_service_ids,
            fetched.manifest_required_service_ids,
        );
        merge_unique(&mut self.result.env_ids, fetched.env_ids);
        merge_unique(&mut self.result.deployment_types, fetched.deployment_types);

        if !self.build_pipeline {
            for variable in fetched.artifact_variables {
                merge_artifact_variable(
                    &mut self.result.artifact_variables,
                    variable,
                    &workflow.id,
                );
            }
        }
        if !fetched.manifest_variables.is_empty()
            && self
                .collab
                .feature_flags
                .is_enabled(&self.config.manifest_feature_flag, &workflow.account_id)
        {
            for variable in fetched.manifest_variables {
                merge_manifest_variable(
                    &mut self.result.manifest_variables,
                    variable,
                    &workflow.id,
                );
            }
        }
        Ok(None)
    }
}

fn merge_unique<T: PartialEq>(target: &mut Vec<T>, incoming: Vec<T>) {
    for item in incoming {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Same name and same associated service: record the workflow on the
/// existing variable. Anything else is a new variable.
pub fn merge_artifact_variable(
    merged: &mut Vec<ArtifactVariable>,
    incoming: ArtifactVariable,
    workflow_id: &str,
) {
    let existing = merged.iter_mut().find(|v| {
        v.name == incoming.name
            && v.associated_service()
                .is_some_and(|service| incoming.associated_service() == Some(service))
    });
    match existing {
        Some(existing) => {
            if !existing.workflow_ids.iter().any(|id| id == workflow_id) {
                existing.workflow_ids.push(workflow_id.to_string());
            }
        }
        None => merged.push(ArtifactVariable {
            workflow_ids: vec![workflow_id.to_string()],
            ..incoming
        }),
    }
}

pub fn merge_manifest_variable(
    merged: &mut Vec<ManifestVariable>,
    incoming: ManifestVariable,
    workflow_id: &str,
) {
    match merged.iter_mut().find(|v| v.service_id == incoming.service_id) {
        Some(existing) => {
            if !existing.workflow_ids.iter().any(|id| id == workflow_id) {
                existing.workflow_ids.push(workflow_id.to_string());
            }
        }
        None => merged.push(ManifestVariable {
            workflow_ids: vec![workflow_id.to_string()],
            ..incoming
        }),
    }
}

// =============================================================================
// REQUIRED ENTITIES
// =============================================================================

/// Entities a caller must provide before triggering the pipeline.
pub fn required_entities(
    pipeline: &Pipeline,
    collab: Collaborators<'_>,
) -> Result<Vec<RequiredEntity>> {

    let mut pipeline = pipeline.clone();
    let mut cache = WorkflowCache::new(
        collab.workflows,
        pipeline.app_id.clone(),
        LoadMode::WithoutServices,
    );
    let mut visitor = RequiredEntitiesVisitor {
        collab,
        has_build: false,
        needs_artifact: false,
    };
    walk(&mut pipeline, &mut cache, WalkOptions::strict(), &mut visitor)?;
    tracing::debug!(
        "Required entities of pipeline {}: build={}, artifact={}",
        pipeline.id,
        visitor.has_build,
        visitor.needs_artifact
    );

    if visitor.has_build || !visitor.needs_artifact {
        Ok(Vec::new())
    } else {
        Ok(vec![RequiredEntity::Artifact])
    }
}

struct RequiredEntitiesVisitor<'r> {
    collab: Collaborators<'r>,
    has_build: bool,
    needs_artifact: bool,
}

impl StageVisitor for RequiredEntitiesVisitor<'_> {
    fn workflow_stage(&mut self, visit: WorkflowVisit<'_>) -> Result<Option<String>> {
        if self.has_build || visit.workflow.is_build() {
            self.has_build = true;
            return Ok(None);
        }
        if self.needs_artifact {
            return Ok(None);
        }
        let fetched = self.collab.workflows.fetch_deployment_metadata(
            visit.workflow,
            &visit.element.workflow_variables,
            false,
            &[Include::ArtifactService],
        )?;
        self.needs_artifact = fetched.is_some_and(|m| !m.artifact_required_service_ids.is_empty());
        Ok(None)
    }
}
