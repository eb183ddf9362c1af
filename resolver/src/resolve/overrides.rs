//! Resolution against caller-supplied pipeline variable values.

use std::collections::{BTreeMap, BTreeSet};

use crate::collab::{Collaborators, Overrides};
use crate::error::{ResolveError, Result};
use crate::expr::{binding_name, is_expression};
use crate::model::{Service, Variable, WorkflowRef};
use crate::walk::{StageVisitor, WorkflowVisit};

use super::looping::update_looping_info;
use super::variables::orchestration_of;

/// Final value of every workflow variable of a stage.
///
/// A stage value bound to `${name}` takes the override of `name`; a missing
/// stage value takes the override of the variable's own name. Anything left
/// unresolved keeps the raw stage value.
pub fn override_workflow_variables(
    workflow_variables: &[Variable],
    stage_values: &BTreeMap<String, String>,
    overrides: &Overrides,
) -> BTreeMap<String, String> {
    let mut resolved = BTreeMap::new();
    for variable in workflow_variables {
        let stage_value = stage_values.get(&variable.name).filter(|v| !v.is_empty());
        let final_value = final_value(stage_value, &variable.name, overrides).or(stage_value);
        if let Some(value) = final_value {
            resolved.insert(variable.name.clone(), value.clone());
        }
    }
    resolved
}

fn final_value<'a>(
    stage_value: Option<&'a String>,
    variable_name: &str,
    overrides: &'a Overrides,
) -> Option<&'a String> {
    match stage_value {
        None => overrides.get(variable_name),
        Some(value) => match binding_name(value) {
            Some(target) => overrides.get(target),
            None => Some(value),
        },
    }
}

/// Fail fast when a mandatory variable of an enabled stage is left unset or
/// still bound to an expression.
pub fn check_workflow_variables_overrides(
    element: &WorkflowRef,
    workflow_variables: &[Variable],
    overrides: &Overrides,
) -> Result<()> {
    if element.is_disabled() {
        return Ok(());
    }

    for variable in workflow_variables.iter().filter(|v| v.mandatory && !v.fixed) {
        let is_entity = variable.is_entity();
        let stage_value = element
            .workflow_variables
            .get(&variable.name)
            .filter(|v| !v.is_empty());
        let resolved = final_value(stage_value, &variable.name, overrides)
            .map(String::as_str)
            .filter(|v| !v.is_empty());
        let prefix = if is_entity { "Templatized" } else { "Required" };

        match resolved {
            None if !element.is_runtime_input(&variable.name) => {
                return Err(ResolveError::invalid_request(format!(
                    "{} variable {} is not set for stage {}",
                    prefix, variable.name, element.name
                )));
            }
            Some(value) if is_expression(value) && (is_entity || !value.contains('.')) => {
                return Err(ResolveError::invalid_request(format!(
                    "{} variable {} for stage {} cannot be left as an expression",
                    prefix, variable.name, element.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Reject comma-separated values for entity variables that take one value.
pub fn validate_multiple_values_allowed(
    pipeline_variables: &[Variable],
    overrides: &Overrides,
) -> Result<()> {
    for variable in pipeline_variables {
        let Some(value) = overrides.get(&variable.name) else {
            continue;
        };
        if value.contains(',') && !variable.allow_multiple_values && variable.is_entity() {
            return Err(ResolveError::invalid_request(format!(
                "variable {} cannot take multiple values",
                variable.name
            )));
        }
    }
    Ok(())
}

// =============================================================================
// RESOLUTION WALK
// =============================================================================

/// Rewrites every stage's variables to their final values and collects the
/// concrete identifiers the pipeline touches.
pub(crate) struct ResolveVisitor<'r> {
    collab: Collaborators<'r>,
    overrides: &'r Overrides,
    pre_execution_checks: bool,
    pub(crate) services: Vec<Service>,
    pub(crate) env_ids: Vec<String>,
    pub(crate) infra_mapping_ids: Vec<String>,
    pub(crate) infra_definition_ids: Vec<String>,
    pub(crate) workflow_ids: Vec<String>,
    pub(crate) has_build_workflow: bool,
    parameterized_env_ids: BTreeSet<String>,
}

impl<'r> ResolveVisitor<'r> {
    pub(crate) fn new(
        collab: Collaborators<'r>,
        overrides: &'r Overrides,
        pre_execution_checks: bool,
    ) -> Self {
        ResolveVisitor {
            collab,
            overrides,
            pre_execution_checks,
            services: Vec::new(),
            env_ids: Vec::new(),
            infra_mapping_ids: Vec::new(),
            infra_definition_ids: Vec::new(),
            workflow_ids: Vec::new(),
            has_build_workflow: false,
            parameterized_env_ids: BTreeSet::new(),
        }
    }
}

impl StageVisitor for ResolveVisitor<'_> {
    fn workflow_stage(&mut self, visit: WorkflowVisit<'_>) -> Result<Option<String>> {
        let WorkflowVisit {
            mut stage,
            element,
            workflow,
            disabled,
        } = visit;
        let orchestration = orchestration_of(workflow)?;

        let invalid = if orchestration.valid {
            None
        } else {
            Some(orchestration.validation_message.clone().unwrap_or_default())
        };

        if self.pre_execution_checks {
            check_workflow_variables_overrides(
                element,
                &orchestration.user_variables,
                self.overrides,
            )?;
        }

        let templated_env = tolerate(
            disabled,
            &element.name,
            self.collab
                .environments
                .resolve_environment_id(workflow, &element.workflow_variables),
        )?
        .flatten();
        if let Some(env_id) = templated_env.filter(|id| is_expression(id)) {
            self.parameterized_env_ids.insert(env_id);
            if self.parameterized_env_ids.len() > 1 {
                return Err(ResolveError::invalid_request(
                    "A pipeline may only have one environment expression across all workflows",
                ));
            }
        }

        let resolved = override_workflow_variables(
            &orchestration.user_variables,
            &element.workflow_variables,
            self.overrides,
        );
        element.workflow_variables = resolved;
        let resolved = &element.workflow_variables;

        update_looping_info(&mut stage, workflow, resolved, &mut self.infra_definition_ids);

        if workflow.is_build() {
            self.has_build_workflow = true;
        } else {
            let services = self
                .collab
                .services
                .resolve_services_for_workflow(workflow, resolved)?;
            for service in services {
                if !self.services.iter().any(|s| s.id == service.id) {
                    self.services.push(service);
                }
            }

            let mapping_ids = self
                .collab
                .workflows
                .resolve_infra_mapping_ids(workflow, resolved)?;
            push_unique(&mut self.infra_mapping_ids, mapping_ids);

            if !*stage.looped {
                let definition_ids = tolerate(
                    disabled,
                    &element.name,
                    self.collab
                        .workflows
                        .resolve_infra_definition_ids(workflow, resolved),
                )?;
                push_unique(&mut self.infra_definition_ids, definition_ids.unwrap_or_default());
            }

            let env_id = tolerate(
                disabled,
                &element.name,
                self.collab.environments.resolve_environment_id(workflow, resolved),
            )?
            .flatten();
            if let Some(env_id) = env_id.filter(|id| !is_expression(id)) {
                push_unique(&mut self.env_ids, [env_id]);
            }
        }

        push_unique(&mut self.workflow_ids, [element.workflow_id.clone()]);
        Ok(invalid)
    }
}

/// Disabled stages never run, so their lookups may fail without failing the
/// pipeline.
fn tolerate<T>(disabled: bool, stage: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if disabled => {
            tracing::warn!("Ignoring lookup failure for disabled stage {}: {}", stage, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn push_unique<I>(target: &mut Vec<String>, values: I)
where
    I: IntoIterator<Item = String>,
{
    for value in values {
        if !target.contains(&value) {
            target.push(value);
        }
    }
}
