//! Workflow-declared variables: the unit propagated into pipeline variables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// ENTITY TYPE
// =============================================================================

/// Closed set of entity kinds a variable value can refer to. A variable with
/// no entity type is plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Service,
    Environment,
    InfrastructureDefinition,
    InfrastructureMapping,
    UserGroup,
    AppdynamicsConfigid,
    AppdynamicsAppid,
    AppdynamicsTierid,
    NewrelicConfigid,
    NewrelicAppid,
    NewrelicMarkerConfigid,
    NewrelicMarkerAppid,
    ElkConfigid,
    ElkIndices,
    SplunkConfigid,
}

impl EntityType {
    pub fn is_infrastructure(self) -> bool {
        matches!(
            self,
            EntityType::InfrastructureDefinition | EntityType::InfrastructureMapping
        )
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EntityType::Service => "Service",
            EntityType::Environment => "Environment",
            EntityType::InfrastructureDefinition => "Infrastructure Definition",
            EntityType::InfrastructureMapping => "Service Infrastructure",
            EntityType::UserGroup => "User Group",
            EntityType::AppdynamicsConfigid => "AppDynamics Server",
            EntityType::AppdynamicsAppid => "AppDynamics Application",
            EntityType::AppdynamicsTierid => "AppDynamics Tier",
            EntityType::NewrelicConfigid => "New Relic Server",
            EntityType::NewrelicAppid => "New Relic Application",
            EntityType::NewrelicMarkerConfigid => "New Relic Marker Server",
            EntityType::NewrelicMarkerAppid => "New Relic Marker Application",
            EntityType::ElkConfigid => "ELK Server",
            EntityType::ElkIndices => "ELK Indices",
            EntityType::SplunkConfigid => "Splunk Server",
        }
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// Entity-specific cross references carried by a variable.
///
/// Multi-valued fields (`related_field`, `service_id`, `infra_id`,
/// `deployment_type`) hold comma-joined lists once merged across stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_field: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parent_fields: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infra_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

// =============================================================================
// VARIABLE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_list: Option<Vec<String>>,
    #[serde(default)]
    pub allow_multiple_values: bool,
    /// `None` until a stage has decided whether the variable is a runtime input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_input: Option<bool>,
    #[serde(default)]
    pub metadata: VariableMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Kind of pipeline state that introduced the variable (e.g. `APPROVAL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_type: Option<String>,
}

impl Variable {
    pub fn text(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn entity(name: impl Into<String>, entity_type: EntityType) -> Self {
        Variable {
            name: name.into(),
            entity_type: Some(entity_type),
            ..Default::default()
        }
    }

    pub fn is_entity(&self) -> bool {
        self.entity_type.is_some()
    }

    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// Find a variable by name in an accumulated list.
pub fn find_variable<'a>(variables: &'a [Variable], name: &str) -> Option<&'a Variable> {
    variables.iter().find(|v| v.name == name)
}

pub fn find_variable_mut<'a>(
    variables: &'a mut [Variable],
    name: &str,
) -> Option<&'a mut Variable> {

    variables.iter_mut().find(|v| v.name == name)
}
