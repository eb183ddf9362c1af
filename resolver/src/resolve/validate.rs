//! Save-time pipeline checks and the stage-level variable drift check.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::collab::Collaborators;
use crate::error::{ResolveError, Result};
use crate::expr::{is_expression, split_values};
use crate::merge::approval::add_approval_variables;
use crate::model::{EntityType, Pipeline, PipelineStageElement, Variable, WorkflowRef};

static STEP_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_\-() ]+$").ok());

/// Compare a stage's values with the variables its workflow declares today.
///
/// Returns the validation message for a stage whose values name variables
/// the workflow no longer has, or that misses a mandatory entity variable.
pub fn validate_workflow_variables(
    workflow_variables: &[Variable],
    element: &WorkflowRef,
) -> Option<String> {
    let declared: BTreeSet<&str> = workflow_variables.iter().map(|v| v.name.as_str()).collect();

    let stale: Vec<&str> = element
        .workflow_variables
        .keys()
        .map(String::as_str)
        .filter(|name| !declared.contains(name))
        .collect();
    if !stale.is_empty() {
        return Some(format!(
            "Workflow Variable(s) {} updated or deleted after adding to the Pipeline",
            quoted(stale)
        ));
    }

    let mut missing: Vec<&str> = workflow_variables
        .iter()
        .filter(|v| v.is_entity() && v.mandatory)
        .map(|v| v.name.as_str())
        .filter(|name| !element.workflow_variables.contains_key(*name))
        .collect();
    if missing.is_empty() {
        return None;
    }
    missing.sort_unstable();
    Some(format!(
        "Workflow Variable(s) {} added or updated after adding to the Pipeline",
        quoted(missing)
    ))
}

fn quoted(names: Vec<&str>) -> String {
    names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn validate_step_name(name: &str) -> Result<()> {
    let valid = STEP_NAME.as_ref().is_some_and(|re| re.is_match(name));
    if valid {
        Ok(())
    } else {
        Err(ResolveError::invalid_request(
            "Pipeline step name can only have a-z, A-Z, 0-9, -, (, ) and _",
        ))
    }
}

/// Step names are the names of each stage's first element and must be
/// unique across the pipeline.
pub fn check_unique_step_names(pipeline: &Pipeline) -> Result<()> {
    let mut seen = BTreeSet::new();
    for stage in &pipeline.pipeline_stages {
        let Some(first) = stage.pipeline_stage_elements.first() else {
            continue;
        };
        if !seen.insert(first.name()) {
            return Err(ResolveError::invalid_request(format!(
                "Duplicate step name {}.",
                first.name()
            )));
        }
    }
    Ok(())
}

/// Checks run when a pipeline is saved.
pub fn validate_pipeline(pipeline: &Pipeline, collab: Collaborators<'_>) -> Result<()> {
    check_unique_step_names(pipeline)?;

    let mut parameterized_env_ids = BTreeSet::new();
    let mut approval_variables = Vec::new();
    for stage in &pipeline.pipeline_stages {
        for element in &stage.pipeline_stage_elements {
            validate_step_name(element.name()).map_err(|e| e.at_stage(element.name()))?;
            match element {
                PipelineStageElement::WorkflowRef(workflow_ref) => {
                    validate_workflow_element(
                        workflow_ref,
                        pipeline,
                        collab,
                        &mut parameterized_env_ids,
                    )
                    .map_err(|e| e.at_stage(workflow_ref.name.clone()))?;
                }
                PipelineStageElement::Approval(approval) => {
                    add_approval_variables(&mut approval_variables, approval, &stage.name)
                        .map_err(|e| e.at_stage(approval.name.clone()))?;
                }
            }
        }
    }
    Ok(())
}

fn validate_workflow_element(
    element: &WorkflowRef,
    pipeline: &Pipeline,
    collab: Collaborators<'_>,
    parameterized_env_ids: &mut BTreeSet<String>,
) -> Result<()> {
    if element.workflow_id.is_empty() {
        return Err(ResolveError::invalid_request(
            "Workflow can not be null for Environment state",
        ));
    }
    let workflow = collab
        .workflows
        .read_workflow(&pipeline.app_id, &element.workflow_id)?
        .filter(|w| w.orchestration().is_some())
        .ok_or_else(|| {
            ResolveError::invalid_request("Workflow can not be null for Environment state")
        })?;

    if let Some(config) = &element.runtime_inputs_config {
        for name in &config.runtime_input_variables {
            if !workflow.user_variables().iter().any(|v| &v.name == name) {
                return Err(ResolveError::invalid_request(format!(
                    "Runtime input variable {} is not defined in workflow {}",
                    name, workflow.name
                )));
            }
        }
    }

    let env_id = collab
        .environments
        .resolve_environment_id(&workflow, &element.workflow_variables)?;
    if let Some(env_id) = env_id.filter(|id| is_expression(id)) {
        parameterized_env_ids.insert(env_id);
        if parameterized_env_ids.len() > 1 {
            return Err(ResolveError::invalid_request(
                "A pipeline may only have one environment expression across all workflows",
            ));
        }
    }
    Ok(())
}

/// Every user group the pipeline references: approval groups, runtime-input
/// approvers and concrete USER_GROUP values bound in stages.
pub fn user_groups(pipeline: &Pipeline, collab: Collaborators<'_>) -> Result<BTreeSet<String>> {
    let mut groups = BTreeSet::new();
    for stage in &pipeline.pipeline_stages {
        let Some(element) = stage.pipeline_stage_elements.first() else {
            continue;
        };
        match element {
            PipelineStageElement::Approval(approval) => {
                groups.extend(approval.user_groups.iter().cloned());
            }
            PipelineStageElement::WorkflowRef(workflow_ref) => {
                if let Some(config) = &workflow_ref.runtime_inputs_config {
                    groups.extend(config.user_group_ids.iter().cloned());
                }
                if workflow_ref.workflow_variables.is_empty()
                    || workflow_ref.workflow_id.is_empty()
                {
                    continue;
                }
                let Some(workflow) = collab
                    .workflows
                    .read_workflow_without_services(&pipeline.app_id, &workflow_ref.workflow_id)?
                else {
                    continue;
                };
                for variable in workflow.user_variables() {
                    if variable.entity_type != Some(EntityType::UserGroup) {
                        continue;
                    }
                    let Some(value) = workflow_ref.workflow_variables.get(&variable.name) else {
                        continue;
                    };
                    if !is_expression(value) {
                        groups.extend(split_values(value).map(str::to_string));
                    }
                }
            }
        }
    }
    Ok(groups)
}
