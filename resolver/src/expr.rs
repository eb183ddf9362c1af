//! `${name}` template expressions bound to pipeline variables.

use std::sync::LazyLock;

use regex::Regex;

static EXPRESSION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\$\{[^{}]*\}$").ok());
static VARIABLE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").ok());


/// Whether the whole value is a single `${...}` expression.
pub fn is_expression(value: &str) -> bool {
    EXPRESSION.as_ref().is_some_and(|re| re.is_match(value))
}

/// The text between `${` and `}`. Returns `None` when the value is not an
/// expression.
pub fn strip_expression(value: &str) -> Option<&str> {
    if !is_expression(value) {
        return None;
    }
    Some(&value[2..value.len() - 1])
}

/// Pipeline variable an expression binds to.
///
/// Dotted expressions (`${workflow.variables.x}`) reference runtime context
/// rather than a pipeline variable and yield `None`.
pub fn binding_name(value: &str) -> Option<&str> {
    strip_expression(value).filter(|name| !name.contains('.'))
}

pub fn validate_variable_name(name: &str) -> bool {
    VARIABLE_NAME.as_ref().is_some_and(|re| re.is_match(name))
}

/// Split a comma-joined value list, dropping blanks.
pub fn split_values(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_plain_expression() {
        assert!(is_expression("${env}"));
        assert!(is_expression("${workflow.variables.x}"));
    }

    #[test]
    fn rejects_partial_and_literal() {
        assert!(!is_expression("env"));
        assert!(!is_expression("prefix-${env}"));
        assert!(!is_expression("${a}${b}"));
        assert!(!is_expression("${env"));
    }

    #[test]
    fn binding_name_skips_dotted() {
        assert_eq!(binding_name("${Service}"), Some("Service"));
        assert_eq!(binding_name("${workflow.variables.x}"), None);
        assert_eq!(binding_name("literal"), None);
    }

    #[test]
    fn strip_keeps_dots() {
        assert_eq!(strip_expression("${a.b}"), Some("a.b"));
    }

    #[test]
    fn variable_name_grammar() {
        assert!(validate_variable_name("approvers_1"));
        assert!(!validate_variable_name("approvers-1"));
        assert!(!validate_variable_name(""));
    }

    #[test]
    fn split_values_trims_and_drops_blanks() {
        let parts: Vec<&str> = split_values("a, b,,c ").collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
    }
}
