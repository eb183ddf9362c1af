//! In-memory collaborators.
//!
//! `InMemoryStore` backs every collaborator trait with plain collections
//! loaded from JSON. It is what the wasm entry points and the tests run
//! against; a server embeds the resolver with its own implementations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collab::{
    EnvironmentCatalog, FeatureFlagOracle, Overrides, PipelineRepository, ServiceCatalog,
    WorkflowRepository,
};
use crate::error::{ResolveError, Result};
use crate::expr::{is_expression, split_values};
use crate::model::{DeploymentMetadata, EntityType, Include, Pipeline, Service, Workflow};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InMemoryStore {
    pub pipelines: Vec<Pipeline>,
    pub workflows: Vec<Workflow>,
    pub services: Vec<Service>,
    /// Canned metadata per workflow id. Workflows without an entry get
    /// metadata derived from their services and phases.
    pub deployment_metadata: BTreeMap<String, DeploymentMetadata>,
    /// Flag name -> accounts the flag is enabled for.
    pub feature_flags: BTreeMap<String, Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ResolveError::parse(format!("Failed to parse store JSON: {}", e)))
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflows.push(workflow);
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_deployment_metadata(
        mut self,
        workflow_id: impl Into<String>,
        metadata: DeploymentMetadata,
    ) -> Self {
        self.deployment_metadata.insert(workflow_id.into(), metadata);
        self
    }

    pub fn with_feature_flag(
        mut self,
        flag: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        self.feature_flags
            .entry(flag.into())
            .or_default()
            .push(account_id.into());
        self
    }

    fn find_workflow(&self, app_id: &str, workflow_id: &str) -> Option<&Workflow> {
        self.workflows
            .iter()
            .find(|w| w.id == workflow_id && (w.app_id.is_empty() || w.app_id == app_id))
    }

    fn service(&self, service_id: &str) -> Result<Service> {
        self.services
            .iter()
            .find(|s| s.id == service_id)
            .cloned()
            .ok_or_else(|| {
                ResolveError::not_found(format!("Service {} does not exist", service_id))
            })
    }
}

/// Concrete ids bound to the workflow's variables of one entity type, or
/// `None` when no such variable has a concrete value.
fn bound_ids(
    workflow: &Workflow,
    overrides: &Overrides,
    entity_type: EntityType,
) -> Option<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    let mut bound = false;
    for variable in workflow.user_variables() {
        if variable.entity_type != Some(entity_type) {
            continue;
        }
        let Some(value) = overrides.get(&variable.name).filter(|v| !is_expression(v)) else {
            continue;
        };
        bound = true;
        for id in split_values(value) {
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
    }
    bound.then_some(ids)
}

impl PipelineRepository for InMemoryStore {
    fn read_pipeline(&self, app_id: &str, pipeline_id: &str) -> Result<Option<Pipeline>> {
        Ok(self
            .pipelines
            .iter()
            .find(|p| p.id == pipeline_id && (p.app_id.is_empty() || p.app_id == app_id))
            .cloned())
    }
}

impl WorkflowRepository for InMemoryStore {
    fn read_workflow(&self, app_id: &str, workflow_id: &str) -> Result<Option<Workflow>> {
        let Some(workflow) = self.find_workflow(app_id, workflow_id) else {
            return Ok(None);
        };
        let mut workflow = workflow.clone();
        if let Some(orchestration) = &workflow.orchestration_workflow {
            workflow.services = orchestration
                .service_ids
                .iter()
                .filter_map(|id| self.services.iter().find(|s| &s.id == id).cloned())
                .collect();
        }
        Ok(Some(workflow))
    }

    fn read_workflow_without_services(
        &self,
        app_id: &str,
        workflow_id: &str,
    ) -> Result<Option<Workflow>> {
        Ok(self.find_workflow(app_id, workflow_id).map(|w| Workflow {
            services: Vec::new(),
            ..w.clone()
        }))
    }

    fn fetch_deployment_metadata(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
        with_default_artifact: bool,
        include: &[Include],
    ) -> Result<Option<DeploymentMetadata>> {
        let mut metadata = match self.deployment_metadata.get(&workflow.id) {
            Some(canned) => canned.clone(),
            None => {
                let Some(orchestration) = workflow.orchestration() else {
                    return Ok(None);
                };
                let artifact_required_service_ids = if workflow.is_build() {
                    Vec::new()
                } else {
                    self.resolve_services_for_workflow(workflow, overrides)?
                        .into_iter()
                        .filter(|s| s.artifact_type.is_some())
                        .map(|s| s.id)
                        .collect()
                };
                let env_ids = self
                    .resolve_environment_id(workflow, overrides)?
                    .filter(|id| !is_expression(id))
                    .into_iter()
                    .collect();
                DeploymentMetadata {
                    artifact_required_service_ids,
                    env_ids,
                    deployment_types: orchestration.deployment_types(),
                    ..Default::default()
                }
            }
        };

        metadata.restrict_to(include);
        if !with_default_artifact {
            for variable in &mut metadata.artifact_variables {
                variable.value = None;
            }
        }
        Ok(Some(metadata))
    }

    fn resolve_infra_mapping_ids(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
    ) -> Result<Vec<String>> {
        Ok(bound_ids(workflow, overrides, EntityType::InfrastructureMapping).unwrap_or_else(|| {
            workflow
                .orchestration()
                .map(|o| o.infra_mapping_ids.clone())
                .unwrap_or_default()
        }))
    }

    fn resolve_infra_definition_ids(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
    ) -> Result<Vec<String>> {
        Ok(bound_ids(workflow, overrides, EntityType::InfrastructureDefinition).unwrap_or_else(|| {
            workflow
                .orchestration()
                .map(|o| o.infra_definition_ids.clone())
                .unwrap_or_default()
        }))
    }
}

impl ServiceCatalog for InMemoryStore {
    fn resolve_services_for_workflow(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
    ) -> Result<Vec<Service>> {
        let ids = bound_ids(workflow, overrides, EntityType::Service).unwrap_or_else(|| {
            workflow
                .orchestration()
                .map(|o| o.service_ids.clone())
                .unwrap_or_default()
        });
        ids.iter().map(|id| self.service(id)).collect()
    }
}

impl EnvironmentCatalog for InMemoryStore {
    fn resolve_environment_id(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
    ) -> Result<Option<String>> {

        let bound = workflow
            .user_variables()
            .iter()
            .filter(|v| v.entity_type == Some(EntityType::Environment))
            .find_map(|v| overrides.get(&v.name).filter(|value| !value.is_empty()));
        Ok(bound
            .cloned()
            .or_else(|| workflow.orchestration().and_then(|o| o.env_id.clone())))
    }
}

impl FeatureFlagOracle for InMemoryStore {
    fn is_enabled(&self, flag: &str, account_id: &str) -> bool {
        self.feature_flags
            .get(flag)
            .is_some_and(|accounts| accounts.iter().any(|a| a == account_id))
    }
}
