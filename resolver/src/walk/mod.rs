//! Stage walker: visits pipeline stages and their elements in declared order.
//!
//! The walker owns element classification (workflow-backed, approval,
//! disabled) and workflow loading. What happens at each element is the
//! visitor's business; the walker only records which elements came back
//! invalid so the caller can build one aggregated message.

pub mod cache;

use std::collections::BTreeSet;

pub use cache::{LoadMode, WorkflowCache};

use crate::error::{ResolveError, Result};
use crate::model::{ApprovalStep, Pipeline, PipelineStageElement, Workflow, WorkflowRef};

/// What to do when a workflow element's visit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    FailFast,
    /// Log the error and let the stage contribute nothing.
    Degrade,
}

#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Visit elements whose disable assertion holds.
    pub include_disabled: bool,
    pub error_policy: ErrorPolicy,
}

impl WalkOptions {
    pub fn strict() -> Self {
        WalkOptions {
            include_disabled: false,
            error_policy: ErrorPolicy::FailFast,
        }
    }
}

/// Stage-level state a workflow visit may read or update.
pub struct StageContext<'s> {
    pub name: &'s str,
    pub looped: &'s mut bool,
    pub loop_variable: &'s mut Option<String>,
}

pub struct WorkflowVisit<'s> {
    pub stage: StageContext<'s>,
    pub element: &'s mut WorkflowRef,
    pub workflow: &'s Workflow,
    pub disabled: bool,
}

pub trait StageVisitor {
    /// Visit a workflow-backed element. Returning `Some(message)` marks the
    /// element and its stage invalid.
    fn workflow_stage(&mut self, visit: WorkflowVisit<'_>) -> Result<Option<String>>;

    fn approval_stage(&mut self, _stage_name: &str, _approval: &ApprovalStep) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkSummary {
    pub invalid_stages: BTreeSet<String>,
}

impl WalkSummary {
    pub fn is_valid(&self) -> bool {
        self.invalid_stages.is_empty()
    }

    /// `Some steps [a, b] are found to be invalid/incomplete.`
    pub fn validation_message(&self) -> Option<String> {
        if self.invalid_stages.is_empty() {
            return None;
        }
        let names: Vec<&str> = self.invalid_stages.iter().map(String::as_str).collect();
        Some(format!(
            "Some steps [{}] are found to be invalid/incomplete.",
            names.join(", ")
        ))
    }
}

/// Walk every stage, then every element within it.
pub fn walk<V: StageVisitor>(
    pipeline: &mut Pipeline,
    cache: &mut WorkflowCache<'_>,
    options: WalkOptions,
    visitor: &mut V,
) -> Result<WalkSummary> {
    let mut summary = WalkSummary::default();
    let pipeline_id = pipeline.id.clone();

    for stage in &mut pipeline.pipeline_stages {
        let stage_name = stage.name.clone();
        let mut stage_invalid: Option<String> = None;

        for element in &mut stage.pipeline_stage_elements {
            let disabled = element.is_disabled();
            if disabled && !options.include_disabled {
                continue;
            }

            match element {
                PipelineStageElement::WorkflowRef(workflow_ref) => {
                    tracing::debug!(
                        "Walking workflow stage {} ({})",
                        stage_name,
                        workflow_ref.name
                    );
                    let visited = visit_workflow(
                        cache,
                        visitor,
                        StageContext {
                            name: &stage_name,
                            looped: &mut stage.looped,
                            loop_variable: &mut stage.loop_variable,
                        },
                        workflow_ref,
                        disabled,
                    );
                    match visited {
                        Ok(Some(message)) => {
                            workflow_ref.mark_invalid(message.clone());
                            summary.invalid_stages.insert(workflow_ref.name.clone());
                            stage_invalid = Some(message);
                        }
                        Ok(None) => {}
                        Err(e) => match options.error_policy {
                            ErrorPolicy::FailFast => {
                                return Err(e.at_stage(workflow_ref.name.clone()));
                            }

                            ErrorPolicy::Degrade => {
                                tracing::warn!(
                                    "Skipping stage {} of pipeline {}: {}",
                                    workflow_ref.name,
                                    pipeline_id,
                                    e
                                );
                            }
                        },
                    }
                }
                PipelineStageElement::Approval(approval) => {
                    tracing::debug!("Walking approval stage {} ({})", stage_name, approval.name);
                    visitor
                        .approval_stage(&stage_name, approval)
                        .map_err(|e| e.at_stage(approval.name.clone()))?;
                }
            }
        }

        if let Some(message) = stage_invalid {
            stage.mark_invalid(message);
        }
    }

    Ok(summary)
}

fn visit_workflow<V: StageVisitor>(
    cache: &mut WorkflowCache<'_>,
    visitor: &mut V,
    stage: StageContext<'_>,
    element: &mut WorkflowRef,
    disabled: bool,
) -> Result<Option<String>> {
    if element.workflow_id.is_empty() {
        return Err(ResolveError::invalid_request(
            "Workflow can not be null for Environment state",
        ));
    }
    let workflow = cache.get_or_load(&element.workflow_id)?;
    visitor.workflow_stage(WorkflowVisit {
        stage,
        element,
        workflow: &workflow,
        disabled,
    })
}
