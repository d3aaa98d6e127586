//! Integration tests for the error-learning pipeline with file-backed stores
//!
//! Each test works in its own temporary directory.

use std::sync::Arc;

use simforge::learning::rules::{DIMENSION_MISMATCH_RULE, UNDEFINED_VARIABLE_RULE};
use simforge::learning::{
    extract_prevention_rules, update_prevention_section, ClassificationRule, ErrorCategory,
    ErrorClassifier, ErrorHistory, ErrorLearner, FileStore, LearningError, PreventionRule,
    PromptDocument, DEFAULT_PROMPT, PREVENTION_HEADER,
};

fn paths(dir: &tempfile::TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    (dir.path().join(".matlab_ai_prompt"), dir.path().join("error_history.json"))
}

/// A rule learned in one session is in the prompt the next session loads
#[test]
fn test_rule_survives_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let (prompt_path, history_path) = paths(&dir);

    {
        let session_one = ErrorLearner::with_files(&prompt_path, &history_path);
        session_one.prompt().load_or_init().unwrap();
        let report = session_one.learn(
            &["Matrix dimensions must agree.".to_string()],
            "a * b",
            "a .* b",
        );
        assert_eq!(report.rules_added.len(), 1);
    }

    let session_two = ErrorLearner::with_files(&prompt_path, &history_path);
    let prompt = session_two.prompt().load().unwrap();

    assert!(extract_prevention_rules(&prompt)
        .iter()
        .any(|rule| rule == DIMENSION_MISMATCH_RULE));
    assert_eq!(session_two.history().load().unwrap().len(), 1);
}

#[test]
fn test_history_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let (prompt_path, history_path) = paths(&dir);
    let learner = ErrorLearner::with_files(&prompt_path, &history_path);
    learner.prompt().write_default().unwrap();

    learner.learn(&["Undefined variable q".to_string()], "y = q;", "q = 1; y = q;");

    let raw = std::fs::read_to_string(&history_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entry = &json["errors"][0];

    assert_eq!(entry["error_message"], "Undefined variable q");
    assert_eq!(entry["error_type"], "undefined_variable");
    assert_eq!(entry["original_code"], "y = q;");
    assert_eq!(entry["fixed_code"], "q = 1; y = q;");
    assert!(entry["timestamp"].is_string());
    assert!(json["last_update"].is_string());
}

/// Without a prompt file, learning records history but writes no prompt
#[test]
fn test_missing_prompt_is_not_created_by_learning() {
    let dir = tempfile::tempdir().unwrap();
    let (prompt_path, history_path) = paths(&dir);
    let learner = ErrorLearner::with_files(&prompt_path, &history_path);

    let report = learner.learn(&["Undefined function foo".to_string()], "a", "b");

    assert!(!report.prompt_updated());
    assert_eq!(report.failures.len(), 1);
    assert!(report.history_saved);
    assert!(!prompt_path.exists());
    assert!(matches!(
        learner.prompt().load(),
        Err(LearningError::PromptMissing { .. })
    ));
}

/// A corrupt history is reported and left on disk untouched
#[test]
fn test_corrupt_history_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let (prompt_path, history_path) = paths(&dir);
    std::fs::write(&history_path, "{ not json").unwrap();

    let history = ErrorHistory::new(Arc::new(FileStore::new(&history_path)));
    assert!(matches!(history.load(), Err(LearningError::Corrupt { .. })));

    let learner = ErrorLearner::with_files(&prompt_path, &history_path);
    learner.prompt().write_default().unwrap();
    let report = learner.learn(&["Undefined function foo".to_string()], "a", "b");

    assert!(!report.history_saved);
    assert!(report.prompt_updated());
    assert_eq!(std::fs::read_to_string(&history_path).unwrap(), "{ not json");
}

#[test]
fn test_prompt_sections_outside_prevention_are_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (prompt_path, history_path) = paths(&dir);
    let learner = ErrorLearner::with_files(&prompt_path, &history_path);
    learner.prompt().write_default().unwrap();

    learner.learn(&["[Line 3] Undefined function bar".to_string()], "a", "b");

    let updated = std::fs::read_to_string(&prompt_path).unwrap();
    let (before_default, _) = DEFAULT_PROMPT.split_once(PREVENTION_HEADER).unwrap();
    let (before_updated, _) = updated.split_once(PREVENTION_HEADER).unwrap();
    assert_eq!(before_default, before_updated);
    assert!(updated.trim_end().ends_with("ALL CHECKS MANDATORY."));
    assert_eq!(updated.matches(UNDEFINED_VARIABLE_RULE).count(), 1);
}

#[test]
fn test_update_prevention_section_is_idempotent() {
    let rule = PreventionRule::new(UNDEFINED_VARIABLE_RULE);

    let once = update_prevention_section(DEFAULT_PROMPT, std::slice::from_ref(&rule));
    let twice = update_prevention_section(&once, std::slice::from_ref(&rule));

    assert_eq!(once, twice);
    assert_eq!(once.matches(UNDEFINED_VARIABLE_RULE).count(), 1);
}

#[test]
fn test_document_without_section_gains_one() {
    let dir = tempfile::tempdir().unwrap();
    let prompt_path = dir.path().join("prompt.txt");
    std::fs::write(&prompt_path, "1. STRUCTS:\n   - scalar fields only\n").unwrap();

    let document = PromptDocument::new(Arc::new(FileStore::new(&prompt_path)));
    let added = document
        .merge_rules(&[PreventionRule::new(UNDEFINED_VARIABLE_RULE)])
        .unwrap();

    assert_eq!(added.len(), 1);
    assert_eq!(document.rules().unwrap(), vec![UNDEFINED_VARIABLE_RULE.to_string()]);
    assert!(document.load().unwrap().starts_with("1. STRUCTS:"));
}

/// Custom classification rules plug in without touching the learner
#[test]
fn test_custom_classifier_rule() {
    let dir = tempfile::tempdir().unwrap();
    let (prompt_path, history_path) = paths(&dir);

    let classifier = ErrorClassifier::default().with_rule_first(ClassificationRule::new(
        ErrorCategory::TypeError,
        |message| message.contains("cell contents reference"),
    ));
    let learner = ErrorLearner::new(
        classifier,
        Arc::new(FileStore::new(&prompt_path)),
        Arc::new(FileStore::new(&history_path)),
    );
    learner.prompt().write_default().unwrap();

    let report = learner.learn(
        &["Cell contents reference from a non-cell array object.".to_string()],
        "a",
        "b",
    );

    assert_eq!(report.records[0].category, ErrorCategory::TypeError);
    let counts = learner.history().category_counts().unwrap();
    assert_eq!(counts.get(&ErrorCategory::TypeError), Some(&1));
}

#[test]
fn test_assertion_failures_get_specific_rules() {
    let dir = tempfile::tempdir().unwrap();
    let (prompt_path, history_path) = paths(&dir);
    let learner = ErrorLearner::with_files(&prompt_path, &history_path);
    learner.prompt().write_default().unwrap();

    let report = learner.learn(&["Assertion failed: t non-monotonic".to_string()], "a", "b");
    let rules = learner.prompt().rules().unwrap();

    assert_eq!(report.records[0].category, ErrorCategory::Other);
    assert!(rules.last().unwrap().ends_with("caused: Assertion failed: t non-monotonic"));
}
