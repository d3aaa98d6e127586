//! Error classification
//!
//! Maps a raw diagnostic or runtime error to an [`ErrorCategory`] by walking
//! an ordered list of rules; the first matching rule wins and anything left
//! over is [`ErrorCategory::Other`].

use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Closed set of error classes the learning pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ArrayBounds,
    DimensionMismatch,
    TypeError,
    UndefinedVariable,
    SyntaxError,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ArrayBounds => "array_bounds",
            ErrorCategory::DimensionMismatch => "dimension_mismatch",
            ErrorCategory::TypeError => "type_error",
            ErrorCategory::UndefinedVariable => "undefined_variable",
            ErrorCategory::SyntaxError => "syntax_error",
            ErrorCategory::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// One predicate → category pair
///
/// Matchers always receive the lowercased message.
pub struct ClassificationRule {
    category: ErrorCategory,
    matcher: Matcher,
}

impl ClassificationRule {
    pub fn new(
        category: ErrorCategory,
        matcher: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            matcher: Box::new(matcher),
        }
    }

    /// Matches when any keyword occurs in the message
    pub fn any_keyword(category: ErrorCategory, keywords: &'static [&'static str]) -> Self {
        Self::new(category, move |message| {
            keywords.iter().any(|k| message.contains(k))
        })
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    fn matches(&self, lowered: &str) -> bool {
        (self.matcher)(lowered)
    }
}

impl fmt::Debug for ClassificationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationRule")
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Ordered classification strategy
#[derive(Debug)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                ClassificationRule::new(ErrorCategory::ArrayBounds, |m| {
                    m.contains("index") && (m.contains("exceeds") || m.contains("bounds"))
                }),
                ClassificationRule::any_keyword(
                    ErrorCategory::DimensionMismatch,
                    &["dimension", "size"],
                ),
                ClassificationRule::any_keyword(ErrorCategory::TypeError, &["type", "class"]),
                ClassificationRule::any_keyword(
                    ErrorCategory::UndefinedVariable,
                    &["undefined", "not found"],
                ),
                ClassificationRule::any_keyword(ErrorCategory::SyntaxError, &["syntax"]),
            ],
        }
    }
}

impl ErrorClassifier {
    /// Classifier with no rules; everything is `Other`
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule at the lowest priority
    pub fn with_rule(mut self, rule: ClassificationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule ahead of all existing ones
    pub fn with_rule_first(mut self, rule: ClassificationRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, message: &str) -> ErrorCategory {
        let lowered = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(ClassificationRule::category)
            .unwrap_or(ErrorCategory::Other)
    }
}

lazy_static! {
    static ref DEFAULT_CLASSIFIER: ErrorClassifier = ErrorClassifier::default();
}

/// Classify with the default rule order
pub fn classify(message: &str) -> ErrorCategory {
    DEFAULT_CLASSIFIER.classify(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_and_bounds_is_array_bounds() {
        assert_eq!(
            classify("Index out of bounds because numel(A)=3"),
            ErrorCategory::ArrayBounds
        );
        assert_eq!(
            classify("Attempted to access INDEX 5; out of BOUNDS"),
            ErrorCategory::ArrayBounds
        );
    }

    #[test]
    fn test_array_bounds_wins_over_dimension() {
        // Mentions "dimensions" too, but bounds is checked first
        assert_eq!(
            classify("Index exceeds matrix dimensions."),
            ErrorCategory::ArrayBounds
        );
    }

    #[test]
    fn test_each_category() {
        assert_eq!(
            classify("Matrix dimensions must agree."),
            ErrorCategory::DimensionMismatch
        );
        assert_eq!(
            classify("Arrays have incompatible sizes for this operation."),
            ErrorCategory::DimensionMismatch
        );
        assert_eq!(
            classify("Conversion to double from struct is not possible: wrong class"),
            ErrorCategory::TypeError
        );
        assert_eq!(
            classify("[Line 10] Undefined function foo"),
            ErrorCategory::UndefinedVariable
        );
        assert_eq!(
            classify("File 'helper.m' not found"),
            ErrorCategory::UndefinedVariable
        );
        assert_eq!(
            classify("Invalid syntax at '='"),
            ErrorCategory::SyntaxError
        );
    }

    #[test]
    fn test_unmatched_is_other() {
        assert_eq!(classify("Out of memory."), ErrorCategory::Other);
        assert_eq!(classify(""), ErrorCategory::Other);
        assert_eq!(classify("Assertion failed."), ErrorCategory::Other);
    }

    #[test]
    fn test_empty_classifier_is_total() {
        let classifier = ErrorClassifier::empty();
        assert_eq!(classifier.classify("Index exceeds"), ErrorCategory::Other);
    }

    #[test]
    fn test_custom_rule_priority() {
        let classifier = ErrorClassifier::default().with_rule_first(
            ClassificationRule::any_keyword(ErrorCategory::SyntaxError, &["parse error"]),
        );
        assert_eq!(
            classifier.classify("Parse error: type mismatch"),
            ErrorCategory::SyntaxError
        );

        let appended = ErrorClassifier::default()
            .with_rule(ClassificationRule::any_keyword(ErrorCategory::TypeError, &["nan"]));
        assert_eq!(appended.classify("NaN produced"), ErrorCategory::TypeError);
        assert_eq!(appended.rules().len(), 6);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::DimensionMismatch).unwrap();
        assert_eq!(json, "\"dimension_mismatch\"");
        assert_eq!(ErrorCategory::UndefinedVariable.to_string(), "undefined_variable");
    }
}
