//! Variable merge rules: how workflow variables of every stage fold into a
//! single pipeline-level variable list.
//!
//! First occurrence of a name sets its defaults; later occurrences only
//! validate consistency and widen metadata. The rules are therefore order
//! sensitive and must be applied in stage order.

pub mod approval;
pub mod entity;
pub mod non_entity;
pub mod parent_fields;

use crate::error::{ResolveError, Result};
use crate::expr::split_values;
use crate::model::{ApprovalStep, EntityType, Variable, WorkflowRef};

use entity::{handle_entity, EntityStage};
use non_entity::{handle_non_entity, merge_non_entity};

/// Pipeline variables accumulated over a walk, in first-seen order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VariableAccumulator {
    variables: Vec<Variable>,
}

impl VariableAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Fold one workflow-backed stage into the accumulator.
    pub fn add_workflow_stage(
        &mut self,
        workflow_variables: &[Variable],
        element: &WorkflowRef,
        with_final_values_only: bool,
    ) -> Result<()> {
        if workflow_variables.is_empty() {
            return Ok(());
        }

        // A stage with no values at all exposes every free text variable
        // under its own name.
        if element.workflow_variables.is_empty() {
            for variable in workflow_variables.iter().filter(|v| !v.is_entity() && !v.fixed) {
                let mut incoming = variable.clone();
                incoming.runtime_input = Some(false);
                merge_non_entity(&mut self.variables, incoming, false)?;
            }
            return Ok(());
        }

        let infra_definition_count = workflow_variables
            .iter()
            .filter(|v| v.entity_type == Some(EntityType::InfrastructureDefinition))
            .count();
        let stage = EntityStage {
            workflow_variables,
            stage_values: &element.workflow_variables,
            with_final_values_only,
        };

        for variable in workflow_variables {
            if variable.name.is_empty() {
                return Err(ResolveError::invalid_request("Empty variable name"));
            }
            let is_runtime = element.is_runtime_input(&variable.name);
            match variable.entity_type {
                None => handle_non_entity(
                    &mut self.variables,
                    variable,
                    element.workflow_variables.get(&variable.name).map(String::as_str),
                    is_runtime,
                )?,
                Some(entity_type) => {
                    let allow_multi = (infra_definition_count == 1
                        && entity_type == EntityType::InfrastructureDefinition)
                        || entity_type == EntityType::UserGroup;
                    handle_entity(&mut self.variables, &stage, variable, allow_multi, is_runtime)?;
                }
            }
        }
        Ok(())
    }

    pub fn add_approval_stage(&mut self, approval: &ApprovalStep, stage_name: &str) -> Result<()> {
        approval::add_approval_variables(&mut self.variables, approval, stage_name)
    }

    /// Entity variables first, then text variables, each in first-seen order.
    pub fn into_ordered(self) -> Vec<Variable> {
        reorder_variables(self.variables)
    }
}

pub fn reorder_variables(variables: Vec<Variable>) -> Vec<Variable> {
    let (mut entities, texts): (Vec<Variable>, Vec<Variable>) =
        variables.into_iter().partition(Variable::is_entity);
    entities.extend(texts);
    entities
}

/// Comma-joined set union of two metadata values, existing parts first.
pub fn join_field_values(stored: Option<&str>, incoming: Option<&str>) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in stored.into_iter().chain(incoming).flat_map(split_values) {
        if !parts.contains(&part) {
            parts.push(part);
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}
