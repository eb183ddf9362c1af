//! Pipeline variables introduced by approval steps.

use crate::error::{ResolveError, Result};
use crate::expr::{is_expression, strip_expression, validate_variable_name};
use crate::model::{find_variable, ApprovalStep, EntityType, Variable};

pub const APPROVAL_STATE_TYPE: &str = "APPROVAL";

/// Expose each user-group template expression of an approval step as a
/// mandatory, multi-valued USER_GROUP variable.
pub fn add_approval_variables(
    accumulated: &mut Vec<Variable>,
    approval: &ApprovalStep,
    stage_name: &str,
) -> Result<()> {
    for template in &approval.template_expressions {
        if template.metadata.entity_type != Some(EntityType::UserGroup) {
            return Err(ResolveError::invalid_request(
                "Approval can only have User Group template expression",
            ));
        }

        let name = expression_variable_name(&template.expression)?;
        if find_variable(accumulated, name).is_some() {
            continue;
        }
        accumulated.push(Variable {
            name: name.to_string(),
            description: Some(format!(
                "Variable for {} entity in {}",
                EntityType::UserGroup.display_name(),
                stage_name
            )),
            entity_type: Some(EntityType::UserGroup),
            mandatory: true,
            allow_multiple_values: true,
            state_type: Some(APPROVAL_STATE_TYPE.to_string()),
            ..Default::default()
        });
    }
    Ok(())
}

fn expression_variable_name(expression: &str) -> Result<&str> {
    let inner = strip_expression(expression).unwrap_or(expression);
    if is_expression(expression) && validate_variable_name(inner) {
        return Ok(inner);
    }
    Err(ResolveError::invalid_request(format!(
        "Template variable:[{}] not in proper format ,should start with ${{ and end with }}, only a-zA-Z0-9_ allowed",
        inner
    )))
}
