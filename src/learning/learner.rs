//! Turns repair attempts into durable prompt rules
//!
//! Learning is best-effort: every step records its failure in the returned
//! [`LearningReport`] and the caller's repair keeps going.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::classifier::ErrorClassifier;
use super::history::{ErrorHistory, ErrorRecord};
use super::prompt::PromptDocument;
use super::rules::{synthesize, PreventionRule};
use super::store::{DocumentStore, FileStore};
use crate::metrics::{ERRORS_CLASSIFIED, LEARNING_FAILURES, RULES_LEARNED};

/// What a single learning event changed
#[derive(Debug, Clone, Default)]
pub struct LearningReport {
    /// Records built for this event, in error order
    pub records: Vec<ErrorRecord>,
    /// Whether `records` reached the history store
    pub history_saved: bool,
    /// Rules newly written into the prompt document
    pub rules_added: Vec<PreventionRule>,
    /// Human-readable description of each step that did not apply
    pub failures: Vec<String>,
}

impl LearningReport {
    pub fn prompt_updated(&self) -> bool {
        !self.rules_added.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Classifier, prompt document, and history wired together
#[derive(Clone)]
pub struct ErrorLearner {
    classifier: Arc<ErrorClassifier>,
    prompt: PromptDocument,
    history: ErrorHistory,
}

impl ErrorLearner {
    pub fn new(
        classifier: ErrorClassifier,
        prompt_store: Arc<dyn DocumentStore>,
        history_store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            classifier: Arc::new(classifier),
            prompt: PromptDocument::new(prompt_store),
            history: ErrorHistory::new(history_store),
        }
    }

    /// Learner backed by files, using the default classifier
    pub fn with_files(
        prompt_path: impl Into<std::path::PathBuf>,
        history_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self::new(
            ErrorClassifier::default(),
            Arc::new(FileStore::new(prompt_path)),
            Arc::new(FileStore::new(history_path)),
        )
    }

    pub fn prompt(&self) -> &PromptDocument {
        &self.prompt
    }

    pub fn history(&self) -> &ErrorHistory {
        &self.history
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Learn from the errors that triggered one repair
    ///
    /// Each error string becomes one [`ErrorRecord`], in the given order.
    /// Candidate rules are merged into the prompt in a single write, then all
    /// records are appended to the history in a single write.
    pub fn learn(&self, errors: &[String], code_before: &str, code_after: &str) -> LearningReport {
        let mut report = LearningReport::default();

        for error in errors {
            let category = self.classifier.classify(error);
            ERRORS_CLASSIFIED.with_label_values(&[category.as_str()]).inc();
            debug!(category = %category, error = %error, "Classified error");
            report
                .records
                .push(ErrorRecord::new(error.as_str(), category, code_before, code_after));
        }

        let candidates: Vec<PreventionRule> = report.records.iter().filter_map(synthesize).collect();

        if !candidates.is_empty() {
            match self.prompt.merge_rules(&candidates) {
                Ok(added) => {
                    for rule in &added {
                        info!(rule = %rule, "Learned prevention rule");
                    }
                    RULES_LEARNED.inc_by(added.len() as u64);
                    report.rules_added = added;
                }
                Err(e) => {
                    warn!(error = %e, "Could not update prompt document");
                    LEARNING_FAILURES.inc();
                    report.failures.push(format!("prompt not updated: {}", e));
                }
            }
        }

        match self.history.append_all(&report.records) {
            Ok(()) => report.history_saved = !report.records.is_empty(),
            Err(e) => {
                warn!(error = %e, "Could not append to error history");
                LEARNING_FAILURES.inc();
                report.failures.push(format!("history not saved: {}", e));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::classifier::ErrorCategory;
    use crate::learning::prompt::DEFAULT_PROMPT;
    use crate::learning::rules::UNDEFINED_VARIABLE_RULE;
    use crate::learning::store::MemoryStore;

    fn learner_with(prompt: Option<&str>) -> (Arc<MemoryStore>, Arc<MemoryStore>, ErrorLearner) {
        let prompt_store = Arc::new(match prompt {
            Some(text) => MemoryStore::with_contents(text),
            None => MemoryStore::new(),
        });
        let history_store = Arc::new(MemoryStore::new());
        let learner = ErrorLearner::new(
            ErrorClassifier::default(),
            prompt_store.clone(),
            history_store.clone(),
        );
        (prompt_store, history_store, learner)
    }

    #[test]
    fn test_learn_adds_rule_and_record() {
        let (prompt_store, _, learner) = learner_with(Some(DEFAULT_PROMPT));

        let report = learner.learn(&["[Line 10] Undefined function foo".to_string()], "old", "new");

        assert!(report.is_clean());
        assert_eq!(report.rules_added.len(), 1);
        assert_eq!(report.rules_added[0].as_str(), UNDEFINED_VARIABLE_RULE);
        assert_eq!(report.records[0].category, ErrorCategory::UndefinedVariable);
        assert!(report.history_saved);

        let prompt = prompt_store.contents().unwrap();
        assert_eq!(prompt.matches(UNDEFINED_VARIABLE_RULE).count(), 1);
        assert_eq!(learner.history().load().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_prompt_still_records_history() {
        let (prompt_store, _, learner) = learner_with(None);

        let report = learner.learn(&["Invalid syntax".to_string()], "a", "b");

        assert!(report.rules_added.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(report.history_saved);
        assert!(prompt_store.contents().is_none());
    }

    #[test]
    fn test_no_rule_for_plain_other_error() {
        let (prompt_store, _, learner) = learner_with(Some(DEFAULT_PROMPT));

        let report = learner.learn(&["Out of memory.".to_string()], "a", "b");

        assert!(report.is_clean());
        assert!(report.rules_added.is_empty());
        assert_eq!(prompt_store.contents().as_deref(), Some(DEFAULT_PROMPT));
        assert_eq!(learner.history().load().unwrap().len(), 1);
    }

    #[test]
    fn test_repeated_errors_keep_every_record() {
        let (_, _, learner) = learner_with(Some(DEFAULT_PROMPT));
        let errors = vec!["Invalid syntax".to_string(), "Invalid syntax".to_string()];

        let report = learner.learn(&errors, "a", "b");

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.rules_added.len(), 1);
        assert_eq!(learner.history().load().unwrap().len(), 2);
    }
}
