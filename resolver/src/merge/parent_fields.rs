//! Cross references between entity variables bound in the same stage.
//!
//! An entity variable can name a related variable of the same workflow
//! through `metadata.relatedField` (an APM application points at its server
//! config, an infrastructure definition at its service). When such a
//! variable is lifted into the pipeline, the concrete values bound to its
//! relatives in that stage are copied onto it as parent fields or ids.

use std::collections::BTreeMap;

use crate::expr::{binding_name, is_expression, split_values, strip_expression};
use crate::model::{EntityType, Variable, VariableMetadata};

pub const ANALYSIS_SERVER_CONFIG_ID: &str = "analysisServerConfigId";
pub const APPLICATION_ID: &str = "applicationId";

/// Fields a rule contributes to a lifted variable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParentFieldDelta {
    pub parent_fields: BTreeMap<String, String>,
    pub env_id: Option<String>,
    pub service_id: Option<String>,
    pub infra_id: Option<String>,
}

impl ParentFieldDelta {
    pub fn apply(self, metadata: &mut VariableMetadata) {
        metadata.parent_fields.extend(self.parent_fields);
        if self.env_id.is_some() {
            metadata.env_id = self.env_id;
        }
        if self.service_id.is_some() {
            metadata.service_id = self.service_id;
        }
        if self.infra_id.is_some() {
            metadata.infra_id = self.infra_id;
        }
    }
}

/// The stage a variable is lifted from.
pub struct RelationScope<'a> {
    /// Entity variables of the workflow that declare a related field.
    pub related: Vec<&'a Variable>,
    pub stage_values: &'a BTreeMap<String, String>,
    /// Workflow-level name of the variable being lifted.
    pub original_name: &'a str,
}

impl<'a> RelationScope<'a> {
    pub fn new(
        workflow_variables: &'a [Variable],
        stage_values: &'a BTreeMap<String, String>,
        original_name: &'a str,
    ) -> Self {
        let related = workflow_variables
            .iter()
            .filter(|v| v.is_entity() && v.metadata.related_field.is_some())
            .collect();
        RelationScope {
            related,
            stage_values,
            original_name,
        }
    }

    /// The stage value of `variable` when it is bound to a literal.
    fn concrete_value(&self, variable: &Variable) -> Option<&'a str> {
        self.stage_values
            .get(&variable.name)
            .map(String::as_str)
            .filter(|v| !is_expression(v))
    }

    fn points_here(&self, variable: &Variable) -> bool {
        variable.metadata.related_field.as_deref() == Some(self.original_name)
    }

    fn parent_fields_from(&self, sources: &[(EntityType, &str)]) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        for variable in &self.related {
            let Some(entity_type) = variable.entity_type else {
                continue;
            };
            let Some((_, key)) = sources.iter().find(|(source, _)| *source == entity_type) else {
                continue;
            };
            if !self.points_here(variable) {
                continue;
            }
            if let Some(value) = self.concrete_value(variable) {
                fields.insert(key.to_string(), value.to_string());
            }
        }
        fields
    }
}

pub type ParentFieldRule = fn(&RelationScope<'_>) -> ParentFieldDelta;

/// Strategy table: which rule fills in the cross references of each entity type.
pub fn parent_field_rule(entity_type: EntityType) -> Option<ParentFieldRule> {
    match entity_type {
        EntityType::Service => Some(service_rule),
        EntityType::InfrastructureDefinition | EntityType::InfrastructureMapping => {
            Some(infrastructure_rule)
        }
        EntityType::AppdynamicsTierid => Some(appdynamics_tier_rule),
        EntityType::AppdynamicsAppid => Some(appdynamics_app_rule),
        EntityType::ElkIndices => Some(elk_indices_rule),
        EntityType::NewrelicAppid => Some(newrelic_app_rule),
        EntityType::NewrelicMarkerAppid => Some(newrelic_marker_app_rule),
        EntityType::SplunkConfigid => Some(splunk_config_rule),
        _ => None,
    }
}

fn service_rule(scope: &RelationScope<'_>) -> ParentFieldDelta {
    let mut delta = ParentFieldDelta::default();
    for variable in &scope.related {
        if variable.entity_type == Some(EntityType::InfrastructureDefinition)
            && scope.points_here(variable)
        {
            if let Some(value) = scope.concrete_value(variable) {
                delta.infra_id = Some(value.to_string());
            }
        }
    }
    delta
}

fn infrastructure_rule(scope: &RelationScope<'_>) -> ParentFieldDelta {
    let mut delta = ParentFieldDelta::default();
    for variable in &scope.related {
        match variable.entity_type {
            Some(EntityType::Environment) => {
                let lists_this = variable
                    .metadata
                    .related_field
                    .as_deref()
                    .is_some_and(|field| {
                        split_values(field).any(|name| name == scope.original_name)
                    });

                if lists_this {
                    if let Some(value) = scope.concrete_value(variable) {
                        delta.env_id = Some(value.to_string());
                    }
                }
            }
            Some(EntityType::Service) if scope.points_here(variable) => {
                if let Some(value) = scope.concrete_value(variable) {
                    delta.service_id = Some(value.to_string());
                }
            }
            _ => {}
        }
    }
    delta
}

fn appdynamics_tier_rule(scope: &RelationScope<'_>) -> ParentFieldDelta {
    ParentFieldDelta {
        parent_fields: scope.parent_fields_from(&[
            (EntityType::AppdynamicsAppid, APPLICATION_ID),
            (EntityType::AppdynamicsConfigid, ANALYSIS_SERVER_CONFIG_ID),
        ]),
        ..Default::default()
    }
}

fn appdynamics_app_rule(scope: &RelationScope<'_>) -> ParentFieldDelta {
    server_config_rule(scope, EntityType::AppdynamicsConfigid)
}

fn elk_indices_rule(scope: &RelationScope<'_>) -> ParentFieldDelta {
    server_config_rule(scope, EntityType::ElkConfigid)
}

fn newrelic_app_rule(scope: &RelationScope<'_>) -> ParentFieldDelta {
    server_config_rule(scope, EntityType::NewrelicConfigid)
}

fn newrelic_marker_app_rule(scope: &RelationScope<'_>) -> ParentFieldDelta {
    server_config_rule(scope, EntityType::NewrelicMarkerConfigid)
}

fn splunk_config_rule(scope: &RelationScope<'_>) -> ParentFieldDelta {
    server_config_rule(scope, EntityType::SplunkConfigid)
}

fn server_config_rule(scope: &RelationScope<'_>, source: EntityType) -> ParentFieldDelta {
    ParentFieldDelta {
        parent_fields: scope.parent_fields_from(&[(source, ANALYSIS_SERVER_CONFIG_ID)]),
        ..Default::default()
    }
}

// =============================================================================
// RELATED FIELD
// =============================================================================

/// Fill in the related field and parent fields of a freshly lifted variable.
pub fn set_parent_and_related_fields(
    workflow_variables: &[Variable],
    stage_values: &BTreeMap<String, String>,
    original: &Variable,
    lifted: &mut Variable,
) {
    let Some(entity_type) = lifted.entity_type else {
        return;
    };
    if entity_type == EntityType::Environment {
        let names = environment_infra_bindings(workflow_variables, stage_values, original);
        lifted.metadata.related_field = if names.is_empty() {
            None
        } else {
            Some(names.join(","))
        };
    } else {
        rename_related_field(stage_values, lifted);
    }

    if let Some(rule) = parent_field_rule(entity_type) {
        let scope = RelationScope::new(workflow_variables, stage_values, &original.name);
        rule(&scope).apply(&mut lifted.metadata);
    }
}

/// Point the related field at the relative's pipeline-level name, or drop it
/// when the relative is bound to a literal in this stage.
fn rename_related_field(stage_values: &BTreeMap<String, String>, lifted: &mut Variable) {
    let Some(related) = lifted.metadata.related_field.as_deref().filter(|f| !f.is_empty()) else {
        return;
    };
    lifted.metadata.related_field = stage_values
        .get(related)
        .and_then(|value| strip_expression(value))
        .map(str::to_string);
}

/// Pipeline-level names of the infrastructure definitions tied to an
/// environment variable in one stage.
///
/// A definition is tied when its related field names the environment or the
/// environment's related field lists it. Definitions bound to a literal have
/// no pipeline-level name and are left out.
pub fn environment_infra_bindings(
    workflow_variables: &[Variable],
    stage_values: &BTreeMap<String, String>,
    environment: &Variable,
) -> Vec<String> {
    let listed: Vec<&str> = environment
        .metadata
        .related_field
        .as_deref()
        .map(|field| split_values(field).collect())
        .unwrap_or_default();

    workflow_variables
        .iter()
        .filter(|v| v.entity_type == Some(EntityType::InfrastructureDefinition))
        .filter(|v| {
            v.metadata.related_field.as_deref() == Some(environment.name.as_str())
                || listed.contains(&v.name.as_str())
        })
        .filter_map(|v| stage_values.get(&v.name).and_then(|value| binding_name(value)))
        .map(str::to_string)
        .collect()
}
