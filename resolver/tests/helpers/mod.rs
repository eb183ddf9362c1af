use std::collections::BTreeMap;

use resolver::model::*;
use resolver::InMemoryStore;

pub const APP_ID: &str = "app";
pub const ACCOUNT_ID: &str = "acct";

// =============================================================================
// Workflow builders
// =============================================================================

pub fn workflow(id: &str, variables: Vec<Variable>) -> Workflow {
    workflow_of_type(id, OrchestrationWorkflowType::Canary, variables)
}

pub fn build_workflow(id: &str, variables: Vec<Variable>) -> Workflow {
    workflow_of_type(id, OrchestrationWorkflowType::Build, variables)
}

pub fn workflow_of_type(
    id: &str,
    workflow_type: OrchestrationWorkflowType,
    variables: Vec<Variable>,
) -> Workflow {
    Workflow {
        id: id.into(),
        app_id: APP_ID.into(),
        account_id: ACCOUNT_ID.into(),
        name: id.into(),
        orchestration_workflow: Some(OrchestrationWorkflow::new(workflow_type, variables)),
        services: vec![],
    }
}

/// Add one phase of the given deployment type.
pub fn with_phase(mut workflow: Workflow, deployment_type: DeploymentType) -> Workflow {
    if let Some(orchestration) = workflow.orchestration_workflow.as_mut() {
        orchestration.workflow_phases.push(WorkflowPhase {
            name: format!("Phase {}", orchestration.workflow_phases.len() + 1),
            deployment_type,
            service_id: None,
            infra_definition_id: None,
        });
    }
    workflow
}

// =============================================================================
// Variable builders
// =============================================================================

pub fn mandatory(variable: Variable) -> Variable {
    Variable {
        mandatory: true,
        ..variable
    }
}

pub fn service_var(name: &str, artifact_type: &str) -> Variable {
    let mut variable = Variable::entity(name, EntityType::Service);
    variable.metadata.artifact_type = Some(artifact_type.into());
    variable
}

pub fn related(name: &str, entity_type: EntityType, related_field: &str) -> Variable {
    let mut variable = Variable::entity(name, entity_type);
    variable.metadata.related_field = Some(related_field.into());
    variable
}

pub fn allowed(name: &str, default: Option<&str>, values: &[&str]) -> Variable {
    Variable {
        value: default.map(str::to_string),
        allowed_list: Some(values.iter().map(|v| v.to_string()).collect()),
        ..Variable::text(name)
    }
}

// =============================================================================
// Pipeline builders
// =============================================================================

pub fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn workflow_ref(name: &str, workflow_id: &str, pairs: &[(&str, &str)]) -> WorkflowRef {
    WorkflowRef {
        name: name.into(),
        workflow_id: workflow_id.into(),
        workflow_variables: values(pairs),
        valid: true,
        ..Default::default()
    }
}

/// A stage holding one workflow element named after the stage.
pub fn stage(name: &str, workflow_id: &str, pairs: &[(&str, &str)]) -> PipelineStage {
    PipelineStage::new(
        name,
        vec![PipelineStageElement::WorkflowRef(workflow_ref(name, workflow_id, pairs))],
    )
}

pub fn runtime_stage(
    name: &str,
    workflow_id: &str,
    pairs: &[(&str, &str)],
    runtime: &[&str],
) -> PipelineStage {

    let mut element = workflow_ref(name, workflow_id, pairs);
    element.runtime_inputs_config = Some(RuntimeInputsConfig {
        runtime_input_variables: runtime.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    });
    PipelineStage::new(name, vec![PipelineStageElement::WorkflowRef(element)])
}

pub fn disabled_stage(name: &str, workflow_id: &str, pairs: &[(&str, &str)]) -> PipelineStage {
    let mut element = workflow_ref(name, workflow_id, pairs);
    element.disable_assertion = Some("true".into());
    PipelineStage::new(name, vec![PipelineStageElement::WorkflowRef(element)])
}

pub fn approval_stage(name: &str, expressions: &[&str], user_groups: &[&str]) -> PipelineStage {
    let approval = ApprovalStep {
        name: name.into(),
        template_expressions: expressions
            .iter()
            .map(|expression| TemplateExpression {
                expression: expression.to_string(),
                field_name: Some("userGroups".into()),
                metadata: TemplateExpressionMetadata {
                    entity_type: Some(EntityType::UserGroup),
                },
            })
            .collect(),
        user_groups: user_groups.iter().map(|g| g.to_string()).collect(),
        ..Default::default()
    };
    PipelineStage::new(name, vec![PipelineStageElement::Approval(approval)])
}

pub fn pipeline(id: &str, stages: Vec<PipelineStage>) -> Pipeline {
    Pipeline::new(id, APP_ID, stages)
}

// =============================================================================
// Store builders
// =============================================================================

pub fn service(id: &str, artifact_type: Option<&str>) -> Service {
    Service {
        id: id.into(),
        name: id.into(),
        deployment_type: None,
        artifact_type: artifact_type.map(str::to_string),
    }
}

pub fn store(pipelines: Vec<Pipeline>, workflows: Vec<Workflow>) -> InMemoryStore {
    let store = pipelines
        .into_iter()
        .fold(InMemoryStore::new(), InMemoryStore::with_pipeline);
    workflows.into_iter().fold(store, InMemoryStore::with_workflow)
}

pub fn workflow_element(pipeline: &Pipeline, stage: usize) -> &WorkflowRef {
    match &pipeline.pipeline_stages[stage].pipeline_stage_elements[0] {
        PipelineStageElement::WorkflowRef(element) => element,
        PipelineStageElement::Approval(_) => panic!("stage {} is an approval", stage),
    }
}

pub fn names(variables: &[Variable]) -> Vec<&str> {
    variables.iter().map(|v| v.name.as_str()).collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
