//! Aggregate deployment metadata and its per-service variables.

use serde::{Deserialize, Serialize};

use super::types::DeploymentType;

/// Which slices of metadata a caller wants gathered. An empty include set
/// means all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Include {
    ArtifactService,
    Environment,
    DeploymentType,
}

impl Include {
    pub fn all() -> Vec<Include> {
        vec![
            Include::ArtifactService,
            Include::Environment,
            Include::DeploymentType,
        ]
    }

    /// Expand an empty include set to every slice.
    pub fn normalize(include: &[Include]) -> Vec<Include> {
        if include.is_empty() {
            Include::all()
        } else {
            include.to_vec()
        }
    }
}

/// Entity kinds a pipeline can require before it is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequiredEntity {
    Artifact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactEntityType {
    Service,
    Environment,
    Workflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMetadata {
    #[serde(default)]
    pub artifact_required_service_ids: Vec<String>,
    #[serde(default)]
    pub manifest_required_service_ids: Vec<String>,
    #[serde(default)]
    pub env_ids: Vec<String>,
    #[serde(default)]
    pub deployment_types: Vec<DeploymentType>,
    #[serde(default)]
    pub artifact_variables: Vec<ArtifactVariable>,
    #[serde(default)]
    pub manifest_variables: Vec<ManifestVariable>,
}

impl DeploymentMetadata {
    /// Drop the slices not asked for.
    pub fn restrict_to(&mut self, include: &[Include]) {
        let include = Include::normalize(include);
        if !include.contains(&Include::ArtifactService) {
            self.artifact_required_service_ids.clear();
            self.manifest_required_service_ids.clear();
            self.artifact_variables.clear();
            self.manifest_variables.clear();
        }
        if !include.contains(&Include::Environment) {
            self.env_ids.clear();
        }
        if !include.contains(&Include::DeploymentType) {
            self.deployment_types.clear();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactVariable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<ArtifactEntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub allowed_list: Vec<String>,
    #[serde(default)]
    pub workflow_ids: Vec<String>,
}

impl ArtifactVariable {
    /// The service the variable is scoped to, if it is service-scoped.
    pub fn associated_service(&self) -> Option<&str> {
        match self.entity_type {
            Some(ArtifactEntityType::Service) => self.entity_id.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVariable {
    pub name: String,
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default)]
    pub workflow_ids: Vec<String>,
}
