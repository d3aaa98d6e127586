//! Error-learning subsystem
//!
//! Converts observed failures into prevention rules that steer future code
//! generation:
//!
//! ```text
//! error text → ErrorClassifier → ErrorCategory
//!                                     ↓
//!                         synthesize() → PreventionRule?
//!                                     ↓
//!            PromptDocument::merge_rules (section 8, deduplicated)
//!
//! every error → ErrorRecord → ErrorHistory (append-only JSON)
//! ```

pub mod classifier;
pub mod history;
pub mod learner;
pub mod prompt;
pub mod rules;
pub mod store;

pub use classifier::{classify, ClassificationRule, ErrorCategory, ErrorClassifier};
pub use history::{ErrorHistory, ErrorRecord, HistoryDocument};
pub use learner::{ErrorLearner, LearningReport};
pub use prompt::{
    extract_prevention_rules, merge_prevention_rules, update_prevention_section, PromptDocument,
    DEFAULT_PROMPT, PREVENTION_HEADER,
};
pub use rules::{synthesize, PreventionRule};
pub use store::{DocumentStore, FileStore, MemoryStore};

/// Failures of the persistent learning documents
#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    #[error("failed to read {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {location}: {source}")]
    Write {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{location} is not a valid error history: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("prompt file not found at {location}")]
    PromptMissing { location: String },
}
