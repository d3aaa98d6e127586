//! Prevention-rule synthesis
//!
//! A rule is chosen by the error's category, not by its literal text. Only
//! uncategorized assertion failures get a rule that quotes the message.

use std::fmt;

use super::classifier::ErrorCategory;
use super::history::ErrorRecord;

/// Single-line directive injected into future generation prompts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreventionRule(String);

impl PreventionRule {
    /// Build a rule, collapsing all whitespace runs (including newlines)
    /// into single spaces
    pub fn new(text: impl AsRef<str>) -> Self {
        Self(text.as_ref().split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PreventionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const ARRAY_BOUNDS_RULE: &str = "Always validate array indices against array dimensions using size() or length() before indexing operations to prevent 'Index exceeds array bounds' errors.";
pub const DIMENSION_MISMATCH_RULE: &str = "Verify matrix dimensions match before operations using size() and assert() to prevent dimension mismatch errors.";
pub const TYPE_ERROR_RULE: &str = "Validate variable types using isa() or class() before operations to ensure type compatibility.";
pub const UNDEFINED_VARIABLE_RULE: &str = "Check for variable existence using exist() before using variables to prevent 'Undefined variable' errors.";
pub const SYNTAX_ERROR_RULE: &str = "Validate MATLAB syntax using mlint() before execution to catch syntax errors early.";

/// Canonical rule text for a category, if it has one
pub fn canonical_rule(category: ErrorCategory) -> Option<&'static str> {
    match category {
        ErrorCategory::ArrayBounds => Some(ARRAY_BOUNDS_RULE),
        ErrorCategory::DimensionMismatch => Some(DIMENSION_MISMATCH_RULE),
        ErrorCategory::TypeError => Some(TYPE_ERROR_RULE),
        ErrorCategory::UndefinedVariable => Some(UNDEFINED_VARIABLE_RULE),
        ErrorCategory::SyntaxError => Some(SYNTAX_ERROR_RULE),
        ErrorCategory::Other => None,
    }
}

/// Derive a prevention rule from a classified error
///
/// Returns `None` for uncategorized errors that are not assertion failures;
/// that is a normal outcome.
pub fn synthesize(record: &ErrorRecord) -> Option<PreventionRule> {
    if let Some(text) = canonical_rule(record.category) {
        return Some(PreventionRule::new(text));
    }

    if record.error_message.to_lowercase().contains("assert") {
        return Some(PreventionRule::new(format!(
            "Add appropriate assert() statements to validate conditions that caused: {}",
            record.error_message.trim()
        )));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message: &str, category: ErrorCategory) -> ErrorRecord {
        ErrorRecord::new(message, category, "", "")
    }

    #[test]
    fn test_same_category_same_rule() {
        let a = synthesize(&record("Index exceeds matrix dimensions", ErrorCategory::ArrayBounds));
        let b = synthesize(&record("index 7 out of bounds", ErrorCategory::ArrayBounds));
        assert_eq!(a, b);
        assert_eq!(a.unwrap().as_str(), ARRAY_BOUNDS_RULE);
    }

    #[test]
    fn test_every_named_category_has_rule() {
        for category in [
            ErrorCategory::ArrayBounds,
            ErrorCategory::DimensionMismatch,
            ErrorCategory::TypeError,
            ErrorCategory::UndefinedVariable,
            ErrorCategory::SyntaxError,
        ] {
            let rule = synthesize(&record("anything", category)).unwrap();
            assert_eq!(Some(rule.as_str()), canonical_rule(category));
        }
    }

    #[test]
    fn test_other_with_assertion_quotes_message() {
        let rule = synthesize(&record(
            "Assertion failed: t non-monotonic",
            ErrorCategory::Other,
        ))
        .unwrap();
        assert_eq!(
            rule.as_str(),
            "Add appropriate assert() statements to validate conditions that caused: Assertion failed: t non-monotonic"
        );
    }

    #[test]
    fn test_other_without_assertion_has_no_rule() {
        assert!(synthesize(&record("Out of memory.", ErrorCategory::Other)).is_none());
    }

    #[test]
    fn test_rule_is_single_line() {
        let rule = synthesize(&record(
            "assert failed\n  in main (line 4)",
            ErrorCategory::Other,
        ))
        .unwrap();
        assert!(!rule.as_str().contains('\n'));
        assert!(rule.as_str().ends_with("assert failed in main (line 4)"));
    }
}
