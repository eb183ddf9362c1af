//! Merge rules for entity-typed variables.

use std::collections::BTreeMap;

use crate::error::{ResolveError, Result};
use crate::expr::binding_name;
use crate::model::{find_variable_mut, EntityType, Variable};

use super::join_field_values;
use super::non_entity::check_runtime;
use super::parent_fields::{environment_infra_bindings, set_parent_and_related_fields};

/// One workflow stage as seen by the entity rules.
pub struct EntityStage<'a> {
    pub workflow_variables: &'a [Variable],
    pub stage_values: &'a BTreeMap<String, String>,
    pub with_final_values_only: bool,
}

/// Lift an entity variable into the pipeline when its stage value is a
/// `${name}` expression. Literal values bind the entity for good and expose
/// nothing.
pub fn handle_entity(
    accumulated: &mut Vec<Variable>,
    stage: &EntityStage<'_>,
    variable: &Variable,
    allow_multi: bool,
    is_runtime: bool,
) -> Result<()> {
    let Some(value) = stage
        .stage_values
        .get(&variable.name)
        .filter(|v| !v.is_empty())
    else {
        return Ok(());
    };
    let Some(name) = binding_name(value) else {
        return Ok(());
    };

    let mut lifted = Variable {
        name: name.to_string(),
        ..variable.clone()
    };
    set_parent_and_related_fields(
        stage.workflow_variables,
        stage.stage_values,
        variable,
        &mut lifted,
    );

    match find_variable_mut(accumulated, name) {
        None => {
            lifted.value = if stage.with_final_values_only {
                None
            } else {
                Some(variable.name.clone())
            };
            lifted.allow_multiple_values = allow_multi;
            lifted.runtime_input = Some(is_runtime);
            accumulated.push(lifted);
            Ok(())
        }
        Some(stored) => update_stored(stored, &lifted, stage, variable, allow_multi, is_runtime),
    }
}

fn update_stored(
    stored: &mut Variable,
    incoming: &Variable,
    stage: &EntityStage<'_>,
    original: &Variable,
    allow_multi: bool,
    is_runtime: bool,
) -> Result<()> {
    match stored.entity_type {
        Some(EntityType::Environment) => {
            let names =
                environment_infra_bindings(stage.workflow_variables, stage.stage_values, original);
            let names = names.join(",");
            stored.metadata.related_field =
                join_field_values(stored.metadata.related_field.as_deref(), Some(names.as_str()));
        }
        Some(EntityType::Service) => merge_service_metadata(stored, incoming)?,
        Some(entity_type) if entity_type.is_infrastructure() => {
            stored.allow_multiple_values = allow_multi && stored.allow_multiple_values;
            merge_infra_metadata(stored, incoming)?;
        }
        _ => {}
    }
    check_runtime(stored, is_runtime)
}

fn merge_service_metadata(stored: &mut Variable, incoming: &Variable) -> Result<()> {
    if let (Some(current), Some(next)) = (
        non_empty(&stored.metadata.artifact_type),
        non_empty(&incoming.metadata.artifact_type),
    ) {
        if current != next {
            return Err(ResolveError::invalid_request(format!(
                "The same Workflow variable name {} cannot be used for Services using different Artifact types. \
                 Change the name of the variable in one or more Workflow.",
                stored.name
            )));
        }
    }

    let metadata = &mut stored.metadata;
    metadata.related_field = join_field_values(
        metadata.related_field.as_deref(),
        incoming.metadata.related_field.as_deref(),
    );
    metadata.deployment_type = join_field_values(
        metadata.deployment_type.as_deref(),
        incoming.metadata.deployment_type.as_deref(),
    );
    metadata.infra_id = join_field_values(
        metadata.infra_id.as_deref(),
        incoming.metadata.infra_id.as_deref(),
    );
    Ok(())
}

fn merge_infra_metadata(stored: &mut Variable, incoming: &Variable) -> Result<()> {
    require_same(
        &stored.metadata.env_id,
        &incoming.metadata.env_id,
        &stored.name,
        "Environment",
    )?;
    require_same(
        &stored.metadata.deployment_type,
        &incoming.metadata.deployment_type,
        &stored.name,
        "DeploymentType",
    )?;

    let metadata = &mut stored.metadata;
    metadata.related_field = join_field_values(
        metadata.related_field.as_deref(),
        incoming.metadata.related_field.as_deref(),
    );
    metadata.service_id = join_field_values(
        metadata.service_id.as_deref(),
        incoming.metadata.service_id.as_deref(),
    );
    Ok(())
}

fn require_same(
    current: &Option<String>,
    next: &Option<String>,
    name: &str,
    what: &str,
) -> Result<()> {

    match (non_empty(current), non_empty(next)) {
        (Some(current), Some(next)) if current != next => Err(ResolveError::invalid_request(format!(
            "The same Workflow variable name {} cannot be used for InfraDefinitions using different {}. \
             Change the name of the variable in one or more Workflow.",
            name, what
        ))),
        _ => Ok(()),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
