//! Merge rules for plain-text variables.

use crate::error::{ResolveError, Result};
use crate::expr::binding_name;
use crate::model::{find_variable_mut, Variable};

/// Bind a workflow's text variable for one stage.
///
/// No stage value keeps the variable under its own name; an expression
/// renames it to the expression target; a literal binds it for good and
/// nothing is exposed upstream.
pub fn handle_non_entity(
    accumulated: &mut Vec<Variable>,
    variable: &Variable,
    stage_value: Option<&str>,
    is_runtime: bool,
) -> Result<()> {
    if variable.fixed {
        return Ok(());
    }
    let incoming = match stage_value.filter(|v| !v.is_empty()) {
        None => variable.clone(),
        Some(value) => match binding_name(value) {
            Some(name) => Variable {
                name: name.to_string(),
                ..variable.clone()
            },
            None => return Ok(()),
        },
    };
    merge_non_entity(accumulated, incoming, is_runtime)
}

pub fn merge_non_entity(
    accumulated: &mut Vec<Variable>,
    mut incoming: Variable,
    is_runtime: bool,
) -> Result<()> {
    match find_variable_mut(accumulated, &incoming.name) {
        None => {
            incoming.runtime_input = Some(is_runtime);
            accumulated.push(incoming);
        }
        Some(existing) => {
            merge_required(existing, &incoming);
            merge_allowed_list(existing, &incoming)?;
            check_runtime(existing, is_runtime)?;
            overwrite_default_value(existing, incoming.value.as_deref());
        }
    }
    Ok(())
}

fn merge_required(existing: &mut Variable, incoming: &Variable) {
    existing.mandatory |= incoming.mandatory;
}

/// Intersect allowed lists, keeping the existing order.
fn merge_allowed_list(existing: &mut Variable, incoming: &Variable) -> Result<()> {
    let Some(incoming_list) = &incoming.allowed_list else {
        return Ok(());
    };
    let current = existing
        .allowed_list
        .get_or_insert_with(|| incoming_list.clone());

    let mut merged: Vec<String> = Vec::new();
    for value in current.iter() {
        if incoming_list.contains(value) && !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    if merged.is_empty() {
        return Err(ResolveError::invalid_request(format!(
            "Variable {} does not have any common allowed values between all stages",
            existing.name
        )));
    }

    if existing.value.as_ref().is_some_and(|v| !merged.contains(v)) {
        existing.value = None;
    }
    existing.allowed_list = Some(merged);
    Ok(())
}

pub(crate) fn check_runtime(existing: &mut Variable, is_runtime: bool) -> Result<()> {
    match existing.runtime_input {
        None => existing.runtime_input = Some(is_runtime),
        Some(current) if current != is_runtime => {
            return Err(ResolveError::invalid_request(format!(
                "Variable {} is not marked as runtime in all pipeline stages",
                existing.name
            )));
        }
        Some(_) => {}
    }
    Ok(())
}

/// A later stage's value only fills an empty slot, and only with a value the
/// allowed list still admits.
fn overwrite_default_value(existing: &mut Variable, value: Option<&str>) {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return;
    };
    if existing.has_value() {
        return;
    }
    let admitted = existing
        .allowed_list
        .as_ref()
        .is_none_or(|list| list.iter().any(|allowed| allowed == value));
    if admitted {
        existing.value = Some(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str, value: Option<&str>, allowed: Option<&[&str]>) -> Variable {
        Variable {
            value: value.map(str::to_string),
            allowed_list: allowed.map(|a| a.iter().map(|s| s.to_string()).collect()),
            ..Variable::text(name)
        }
    }

    #[test]
    fn first_occurrence_is_cloned_with_runtime_flag() {
        let mut acc = Vec::new();
        handle_non_entity(&mut acc, &text("team", Some("core"), None), None, true).unwrap();
        assert_eq!(acc.len(), 1);
        assert_eq!(acc[0].runtime_input, Some(true));
        assert_eq!(acc[0].value.as_deref(), Some("core"));
    }

    #[test]
    fn expression_renames_variable() {
        let mut acc = Vec::new();
        handle_non_entity(&mut acc, &text("team", None, None), Some("${owner}"), false).unwrap();
        assert_eq!(acc[0].name, "owner");
    }

    #[test]
    fn literal_and_dotted_values_expose_nothing() {
        let mut acc = Vec::new();
        handle_non_entity(&mut acc, &text("team", None, None), Some("core"), false).unwrap();
        handle_non_entity(
            &mut acc,
            &text("team", None, None),
            Some("${workflow.variables.x}"),
            false,
        )
        .unwrap();
        assert!(acc.is_empty());
    }

    #[test]
    fn fixed_variables_are_skipped() {
        let mut acc = Vec::new();
        let fixed = Variable {
            fixed: true,
            ..text("team", None, None)
        };
        handle_non_entity(&mut acc, &fixed, None, false).unwrap();
        assert!(acc.is_empty());
    }

    #[test]
    fn mandatory_is_sticky() {
        let mut acc = Vec::new();
        let required = Variable {
            mandatory: true,
            ..text("team", None, None)
        };
        merge_non_entity(&mut acc, required, false).unwrap();
        merge_non_entity(&mut acc, text("team", None, None), false).unwrap();
        assert!(acc[0].mandatory);
    }

    #[test]
    fn allowed_lists_intersect_and_clear_value() {
        let mut acc = Vec::new();
        merge_non_entity(&mut acc, text("region", Some("a"), Some(&["a", "b"])), false).unwrap();
        merge_non_entity(&mut acc, text("region", None, Some(&["b", "c"])), false).unwrap();
        assert_eq!(acc[0].allowed_list, Some(vec!["b".to_string()]));
        assert_eq!(acc[0].value, None);
    }

    #[test]
    fn disjoint_allowed_lists_fail() {
        let mut acc = Vec::new();
        merge_non_entity(&mut acc, text("region", None, Some(&["a"])), false).unwrap();
        let err =
            merge_non_entity(&mut acc, text("region", None, Some(&["b"])), false).unwrap_err();

        assert_eq!(
            err.message,
            "Variable region does not have any common allowed values between all stages"
        );
    }

    #[test]
    fn first_writer_wins_default_value() {
        let mut acc = Vec::new();
        merge_non_entity(&mut acc, text("team", Some("first"), None), false).unwrap();
        merge_non_entity(&mut acc, text("team", Some("second"), None), false).unwrap();
        assert_eq!(acc[0].value.as_deref(), Some("first"));
    }

    #[test]
    fn later_value_fills_empty_slot_when_allowed() {
        let mut acc = Vec::new();
        merge_non_entity(&mut acc, text("region", None, Some(&["a", "b"])), false).unwrap();
        merge_non_entity(&mut acc, text("region", Some("c"), None), false).unwrap();
        assert_eq!(acc[0].value, None);
        merge_non_entity(&mut acc, text("region", Some("b"), None), false).unwrap();
        assert_eq!(acc[0].value.as_deref(), Some("b"));
    }

    #[test]
    fn runtime_mismatch_fails() {
        let mut acc = Vec::new();
        merge_non_entity(&mut acc, text("token", None, None), true).unwrap();
        let err = merge_non_entity(&mut acc, text("token", None, None), false).unwrap_err();
        assert!(err.is_invalid_request());
        assert_eq!(err.message, "Variable token is not marked as runtime in all pipeline stages");
    }
}
