//! Exposed pipeline variables and the summary flags computed alongside them.

use crate::error::{ResolveError, Result};
use crate::expr::is_expression;
use crate::merge::VariableAccumulator;
use crate::model::{
    ApprovalStep, DeploymentType, OrchestrationWorkflow, Pipeline, Variable, Workflow, WorkflowRef,
};
use crate::walk::{StageVisitor, WalkSummary, WorkflowVisit};

use super::validate::validate_workflow_variables;

/// Walks enabled stages and folds their variables into one list.
pub(crate) struct DetailsVisitor {
    accumulator: VariableAccumulator,
    with_final_values_only: bool,
    has_ssh_infra_mapping: bool,
    templatized: bool,
    env_parameterized: bool,
    deployment_types: Vec<DeploymentType>,
}

impl DetailsVisitor {
    pub(crate) fn new(with_final_values_only: bool) -> Self {
        DetailsVisitor {
            accumulator: VariableAccumulator::new(),
            with_final_values_only,
            has_ssh_infra_mapping: false,
            templatized: false,
            env_parameterized: false,
            deployment_types: Vec::new(),
        }
    }

    pub(crate) fn into_variables(self) -> Vec<Variable> {
        self.accumulator.into_ordered()
    }

    /// Write the walk's results onto the pipeline.
    pub(crate) fn apply(self, pipeline: &mut Pipeline, summary: &WalkSummary) {
        if let Some(message) = summary.validation_message() {
            pipeline.valid = false;
            pipeline.validation_message = Some(message);
        }
        pipeline.has_ssh_infra_mapping = self.has_ssh_infra_mapping;
        pipeline.env_parameterized = self.env_parameterized;
        pipeline.templatized = self.templatized;
        pipeline.deployment_types = self.deployment_types;
        pipeline.pipeline_variables = self.accumulator.into_ordered();
    }
}

impl StageVisitor for DetailsVisitor {
    fn workflow_stage(&mut self, visit: WorkflowVisit<'_>) -> Result<Option<String>> {
        let orchestration = orchestration_of(visit.workflow)?;
        let element = &*visit.element;

        self.has_ssh_infra_mapping |= orchestration.has_ssh_phase();
        for deployment_type in orchestration.deployment_types() {
            if !self.deployment_types.contains(&deployment_type) {
                self.deployment_types.push(deployment_type);
            }
        }
        if !element.workflow_variables.is_empty() {
            self.templatized = true;
        }

        let mut invalid = None;
        if !orchestration.valid {
            invalid = Some(orchestration.validation_message.clone().unwrap_or_default());
        }
        if let Some(message) = validate_workflow_variables(&orchestration.user_variables, element) {
            invalid = Some(message);
        }

        self.accumulator.add_workflow_stage(
            &orchestration.user_variables,
            element,
            self.with_final_values_only,
        )?;
        if !self.env_parameterized {
            self.env_parameterized = entity_parameterized(&orchestration.user_variables, element);
        }
        Ok(invalid)
    }

    fn approval_stage(&mut self, stage_name: &str, approval: &ApprovalStep) -> Result<()> {
        self.accumulator.add_approval_stage(approval, stage_name)
    }
}

pub(crate) fn orchestration_of(workflow: &Workflow) -> Result<&OrchestrationWorkflow> {
    workflow
        .orchestration()
        .ok_or_else(|| ResolveError::not_found("Orchestration workflow does not exist"))
}

/// Whether the stage binds any entity variable to an expression.
fn entity_parameterized(workflow_variables: &[Variable], element: &WorkflowRef) -> bool {
    workflow_variables
        .iter()
        .filter(|v| v.is_entity())
        .filter_map(|v| element.workflow_variables.get(&v.name))
        .any(|value| is_expression(value))
}
