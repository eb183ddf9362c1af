//! Pipeline and workflow value objects.
//!
//! These types are the serde target for the pipeline/workflow JSON documents
//! handed over by the repositories. Everything is produced fresh per call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::variable::{EntityType, Variable};

fn default_true() -> bool {
    true
}

// =============================================================================
// PIPELINE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pipeline_stages: Vec<PipelineStage>,

    // Computed by the resolver, never authored.
    #[serde(default)]
    pub pipeline_variables: Vec<Variable>,
    #[serde(default = "default_true")]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
    #[serde(default)]
    pub templatized: bool,
    #[serde(default)]
    pub env_parameterized: bool,
    #[serde(default)]
    pub has_build_workflow: bool,
    #[serde(default)]
    pub has_ssh_infra_mapping: bool,
    #[serde(default)]
    pub deployment_types: Vec<DeploymentType>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub env_ids: Vec<String>,
    #[serde(default)]
    pub infra_mapping_ids: Vec<String>,
    #[serde(default)]
    pub infra_definition_ids: Vec<String>,
    #[serde(default)]
    pub workflow_ids: Vec<String>,
}

impl Pipeline {
    pub fn new(
        id: impl Into<String>,
        app_id: impl Into<String>,
        stages: Vec<PipelineStage>,
    ) -> Self {

        Pipeline {
            id: id.into(),
            app_id: app_id.into(),
            name: String::new(),
            pipeline_stages: stages,
            pipeline_variables: Vec::new(),
            valid: true,
            validation_message: None,
            templatized: false,
            env_parameterized: false,
            has_build_workflow: false,
            has_ssh_infra_mapping: false,
            deployment_types: Vec::new(),
            services: Vec::new(),
            env_ids: Vec::new(),
            infra_mapping_ids: Vec::new(),
            infra_definition_ids: Vec::new(),
            workflow_ids: Vec::new(),
        }
    }

    /// Assign group indexes to stages and ids to elements.
    ///
    /// A non-parallel stage opens a new group; parallel stages join the group
    /// of the stage before them and take its name.
    pub fn ensure_stage_ids_and_parallel_index(&mut self) {
        let mut parallel_index = 0;
        let mut group_name = match self.pipeline_stages.first() {
            Some(stage) => stage.name.clone(),
            None => return,
        };

        for stage in &mut self.pipeline_stages {
            if !stage.parallel {
                parallel_index += 1;
            }
            if stage.name.is_empty() {
                stage.name = format!("STAGE {}", parallel_index);
            }
            if stage.parallel {
                stage.name = group_name.clone();
            } else {
                group_name = stage.name.clone();
            }
            stage.parallel_index = parallel_index;
            for element in &mut stage.pipeline_stage_elements {
                if element.id().is_none() {
                    element.set_id(uuid::Uuid::new_v4().to_string());
                }
                element.set_parallel_index(parallel_index);
            }
        }
    }
}

// =============================================================================
// STAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub parallel_index: u32,
    #[serde(default)]
    pub looped: bool,
    /// Workflow variable the stage fans out over when `looped` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_variable: Option<String>,
    #[serde(default = "default_true")]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
    #[serde(default)]
    pub pipeline_stage_elements: Vec<PipelineStageElement>,
}

impl PipelineStage {
    pub fn new(name: impl Into<String>, elements: Vec<PipelineStageElement>) -> Self {
        PipelineStage {
            name: name.into(),
            parallel: false,
            parallel_index: 0,
            looped: false,
            loop_variable: None,
            valid: true,
            validation_message: None,
            pipeline_stage_elements: elements,
        }
    }

    pub fn mark_invalid(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.validation_message = Some(message.into());
    }
}

/// A stage element: either a reference to a workflow (`ENV_STATE`) or an
/// approval step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineStageElement {
    #[serde(rename = "ENV_STATE")]
    WorkflowRef(WorkflowRef),
    #[serde(rename = "APPROVAL")]
    Approval(ApprovalStep),
}

impl PipelineStageElement {
    pub fn name(&self) -> &str {
        match self {
            PipelineStageElement::WorkflowRef(e) => &e.name,
            PipelineStageElement::Approval(e) => &e.name,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            PipelineStageElement::WorkflowRef(e) => e.id.as_deref(),
            PipelineStageElement::Approval(e) => e.id.as_deref(),
        }
    }

    pub fn set_id(&mut self, id: String) {
        match self {
            PipelineStageElement::WorkflowRef(e) => e.id = Some(id),
            PipelineStageElement::Approval(e) => e.id = Some(id),
        }
    }

    pub fn set_parallel_index(&mut self, index: u32) {
        match self {
            PipelineStageElement::WorkflowRef(e) => e.parallel_index = index,
            PipelineStageElement::Approval(e) => e.parallel_index = index,
        }
    }

    pub fn disable_assertion(&self) -> Option<&str> {
        match self {
            PipelineStageElement::WorkflowRef(e) => e.disable_assertion.as_deref(),
            PipelineStageElement::Approval(e) => e.disable_assertion.as_deref(),
        }
    }

    /// Whether the element's skip condition holds. Only a literal `true`
    /// disables an element; expressions are decided at execution time.
    pub fn is_disabled(&self) -> bool {
        check_disable_assertion(self.disable_assertion())
    }
}

pub fn check_disable_assertion(assertion: Option<&str>) -> bool {
    assertion.is_some_and(|a| a.trim().eq_ignore_ascii_case("true"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub workflow_id: String,
    /// Workflow variable name -> raw stage value (literal or `${expr}`).
    #[serde(default)]
    pub workflow_variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_inputs_config: Option<RuntimeInputsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_assertion: Option<String>,
    #[serde(default)]
    pub parallel_index: u32,
    #[serde(default = "default_true")]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
}

impl WorkflowRef {
    pub fn is_disabled(&self) -> bool {
        check_disable_assertion(self.disable_assertion.as_deref())
    }

    pub fn is_runtime_input(&self, variable_name: &str) -> bool {
        self.runtime_inputs_config
            .as_ref()
            .is_some_and(|c| c.runtime_input_variables.iter().any(|v| v == variable_name))
    }

    pub fn mark_invalid(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.validation_message = Some(message.into());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInputsConfig {
    #[serde(default)]
    pub runtime_input_variables: Vec<String>,
    #[serde(default)]
    pub user_group_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_assertion: Option<String>,
    #[serde(default)]
    pub parallel_index: u32,
    #[serde(default)]
    pub template_expressions: Vec<TemplateExpression>,
    #[serde(default)]
    pub user_groups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateExpression {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default)]
    pub metadata: TemplateExpressionMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateExpressionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
}

// =============================================================================
// WORKFLOW
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration_workflow: Option<OrchestrationWorkflow>,
    /// Populated only by a full read (`read_workflow`), not by the light one.
    #[serde(default)]
    pub services: Vec<Service>,
}

impl Workflow {
    /// The orchestration definition. Workflows handed out by the lookup cache
    /// always carry one.
    pub fn orchestration(&self) -> Option<&OrchestrationWorkflow> {
        self.orchestration_workflow.as_ref()
    }

    pub fn user_variables(&self) -> &[Variable] {
        self.orchestration_workflow
            .as_ref()
            .map(|o| o.user_variables.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_build(&self) -> bool {
        self.orchestration_workflow
            .as_ref()
            .is_some_and(|o| o.orchestration_workflow_type == OrchestrationWorkflowType::Build)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationWorkflowType {
    Build,
    Basic,
    Canary,
    Rolling,
    BlueGreen,
    MultiService,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationWorkflow {
    pub orchestration_workflow_type: OrchestrationWorkflowType,
    #[serde(default)]
    pub user_variables: Vec<Variable>,
    #[serde(default = "default_true")]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
    /// Environment id, or `${expr}` when the environment is templatized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_id: Option<String>,
    #[serde(default)]
    pub service_ids: Vec<String>,
    #[serde(default)]
    pub infra_definition_ids: Vec<String>,
    #[serde(default)]
    pub infra_mapping_ids: Vec<String>,
    #[serde(default)]
    pub workflow_phases: Vec<WorkflowPhase>,
}

impl OrchestrationWorkflow {
    pub fn new(workflow_type: OrchestrationWorkflowType, user_variables: Vec<Variable>) -> Self {
        OrchestrationWorkflow {
            orchestration_workflow_type: workflow_type,
            user_variables,
            valid: true,
            validation_message: None,
            env_id: None,
            service_ids: Vec::new(),
            infra_definition_ids: Vec::new(),
            infra_mapping_ids: Vec::new(),
            workflow_phases: Vec::new(),
        }
    }

    pub fn has_ssh_phase(&self) -> bool {
        self.workflow_phases
            .iter()
            .any(|p| p.deployment_type == DeploymentType::Ssh)
    }

    /// Distinct phase deployment types in phase order.
    pub fn deployment_types(&self) -> Vec<DeploymentType> {
        let mut types = Vec::new();
        for phase in &self.workflow_phases {
            if !types.contains(&phase.deployment_type) {
                types.push(phase.deployment_type);
            }
        }
        types
    }

    pub fn variables_of_type(&self, entity_type: EntityType) -> impl Iterator<Item = &Variable> {
        self.user_variables
            .iter()
            .filter(move |v| v.entity_type == Some(entity_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPhase {
    #[serde(default)]
    pub name: String,
    pub deployment_type: DeploymentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_definition_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentType {
    Ssh,
    Kubernetes,
    Helm,
    Ecs,
    AwsCodedeploy,
    AwsLambda,
    Ami,
    Winrm,
    Pcf,
    AzureVmss,
    AzureWebapp,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<DeploymentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}
