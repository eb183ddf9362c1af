//! Looped stages: one stage fanning out over several infrastructure
//! definitions.

use std::collections::BTreeMap;

use crate::expr::split_values;
use crate::model::{EntityType, Pipeline, PipelineStage, PipelineStageElement, Workflow};
use crate::walk::StageContext;

use super::overrides::push_unique;

/// Mark the stage looped when its workflow has a single infrastructure
/// definition variable resolved to more than one id. The ids are recorded
/// directly since a looped stage is not resolved per definition.
pub fn update_looping_info(
    stage: &mut StageContext<'_>,
    workflow: &Workflow,
    resolved: &BTreeMap<String, String>,
    infra_definition_ids: &mut Vec<String>,
) {
    let Some(orchestration) = workflow.orchestration() else {
        return;
    };
    let mut infra_variables = orchestration.variables_of_type(EntityType::InfrastructureDefinition);
    let (Some(variable), None) = (infra_variables.next(), infra_variables.next()) else {
        return;
    };
    let Some(value) = resolved.get(&variable.name) else {
        return;
    };

    let ids: Vec<String> = split_values(value).map(str::to_string).collect();
    if ids.len() < 2 {
        return;
    }
    *stage.looped = true;
    *stage.loop_variable = Some(variable.name.clone());
    push_unique(infra_definition_ids, ids);
}

/// Replace every looped stage with one parallel stage per loop value.
///
/// Expanded stages are named `{stage}{separator}{n}` counting from 1, keep
/// the original parallel index and get fresh element ids. The first one
/// keeps the original's `parallel` flag so the group stays anchored.
pub fn expand_looped_stages(pipeline: &mut Pipeline, separator: &str) {
    let stages = std::mem::take(&mut pipeline.pipeline_stages);
    for stage in stages {
        let values = loop_values(&stage);
        if values.len() < 2 {
            pipeline.pipeline_stages.push(stage);
            continue;
        }

        tracing::debug!("Expanding looped stage {} into {} stages", stage.name, values.len());
        let loop_variable = stage.loop_variable.clone().unwrap_or_default();
        for (n, value) in values.iter().enumerate() {
            let suffix = format!("{}{}", separator, n + 1);
            let mut expanded = stage.clone();
            expanded.name = format!("{}{}", stage.name, suffix);
            expanded.parallel = n == 0 && stage.parallel || n > 0;
            expanded.looped = false;
            expanded.loop_variable = None;
            for element in &mut expanded.pipeline_stage_elements {
                element.set_id(uuid::Uuid::new_v4().to_string());
                if let PipelineStageElement::WorkflowRef(workflow_ref) = element {
                    workflow_ref.name = format!("{}{}", workflow_ref.name, suffix);
                    if let Some(bound) = workflow_ref.workflow_variables.get_mut(&loop_variable) {
                        *bound = value.clone();
                    }
                }
            }
            pipeline.pipeline_stages.push(expanded);
        }
    }
}

fn loop_values(stage: &PipelineStage) -> Vec<String> {
    if !stage.looped {
        return Vec::new();
    }
    let Some(loop_variable) = &stage.loop_variable else {
        return Vec::new();
    };
    stage
        .pipeline_stage_elements
        .iter()
        .find_map(|element| match element {
            PipelineStageElement::WorkflowRef(workflow_ref) => {
                workflow_ref.workflow_variables.get(loop_variable)
            }
            PipelineStageElement::Approval(_) => None,
        })
        .map(|value| split_values(value).map(str::to_string).collect())
        .unwrap_or_default()
}
