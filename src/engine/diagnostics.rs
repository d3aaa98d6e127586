//! Lint diagnostics exchanged with the validation engine
//!
//! Engines report findings as text lines of the form `[Line N] message`, and
//! a clean run as the single sentinel [`NO_ISSUES`]. [`normalize`] turns both
//! into structured [`Diagnostic`]s, with a clean run becoming an empty list.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

/// Sentinel an engine returns when validation found nothing
pub const NO_ISSUES: &str = "No issues found.";

lazy_static! {
    static ref LINE_PREFIX_RE: Regex = Regex::new(r"^\[Line (\d+)\]\s*(.*)$").unwrap();
}

/// A single lint finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    /// Parse `[Line N] message`; text without the prefix has no line
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match LINE_PREFIX_RE.captures(text) {
            Some(caps) => Self {
                line: caps[1].parse().ok(),
                message: caps[2].to_string(),
            },
            None => Self {
                line: None,
                message: text.to_string(),
            },
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[Line {}] {}", line, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Whether a raw line is the "no issues" sentinel
pub fn is_no_issues(text: &str) -> bool {
    text.trim() == NO_ISSUES
}

/// Parse raw engine output, dropping the sentinel and blank lines
///
/// Order is preserved and duplicates are kept.
pub fn normalize<S: AsRef<str>>(raw: &[S]) -> Vec<Diagnostic> {
    raw.iter()
        .filter_map(|s| {
            let line: &str = s.as_ref();
            if line.trim().is_empty() || is_no_issues(line) {
                None
            } else {
                Some(Diagnostic::parse(line))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_line() {
        let d = Diagnostic::parse("[Line 10] Undefined function foo");
        assert_eq!(d.line, Some(10));
        assert_eq!(d.message, "Undefined function foo");
        assert_eq!(d.to_string(), "[Line 10] Undefined function foo");
    }

    #[test]
    fn test_parse_without_line() {
        let d = Diagnostic::parse("  Parse error somewhere ");
        assert_eq!(d.line, None);
        assert_eq!(d.to_string(), "Parse error somewhere");
    }

    #[test]
    fn test_sentinel_and_empty_are_equivalent() {
        assert!(normalize(&[NO_ISSUES]).is_empty());
        assert!(normalize::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_normalize_keeps_order_and_duplicates() {
        let raw = vec![
            "[Line 3] b".to_string(),
            "[Line 1] a".to_string(),
            "[Line 3] b".to_string(),
        ];
        let diagnostics = normalize(&raw);
        let lines: Vec<_> = diagnostics.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![Some(3), Some(1), Some(3)]);
    }
}
