//! Append-only error history
//!
//! The history is one JSON document: every [`ErrorRecord`] seen so far plus a
//! `last_update` timestamp. Appending rewrites the whole document so the
//! timestamp and the records always change together.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::ErrorCategory;
use super::store::DocumentStore;
use super::LearningError;

/// One observed failure and the code around its repair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub error_message: String,
    #[serde(rename = "error_type")]
    pub category: ErrorCategory,
    #[serde(rename = "original_code")]
    pub code_before: String,
    #[serde(rename = "fixed_code")]
    pub code_after: String,
}

impl ErrorRecord {
    pub fn new(
        error_message: impl Into<String>,
        category: ErrorCategory,
        code_before: impl Into<String>,
        code_after: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            error_message: error_message.into(),
            category,
            code_before: code_before.into(),
            code_after: code_after.into(),
        }
    }
}

/// On-disk shape of the history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryDocument {
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default, with = "timestamp::option")]
    pub last_update: Option<DateTime<Utc>>,
}

/// RFC 3339 on write; on read also accepts ISO timestamps without an
/// offset, taken as UTC
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    pub fn parse(text: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                text.parse::<NaiveDateTime>()
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            })
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", text)))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(text) => parse(&text)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", text))),
            }
        }
    }
}

/// Error history backed by a [`DocumentStore`]
#[derive(Clone)]
pub struct ErrorHistory {
    store: Arc<dyn DocumentStore>,
}

impl ErrorHistory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    /// Full document; empty when nothing has been persisted yet
    pub fn load_document(&self) -> Result<HistoryDocument, LearningError> {
        match self.store.read()? {
            None => Ok(HistoryDocument::default()),
            Some(text) if text.trim().is_empty() => Ok(HistoryDocument::default()),
            Some(text) => serde_json::from_str(&text).map_err(|e| LearningError::Corrupt {
                location: self.store.location(),
                source: e,
            }),
        }
    }

    /// Records in the order they were appended
    pub fn load(&self) -> Result<Vec<ErrorRecord>, LearningError> {
        Ok(self.load_document()?.errors)
    }

    pub fn append(&self, record: ErrorRecord) -> Result<(), LearningError> {
        self.append_all(std::slice::from_ref(&record))
    }

    /// Append several records with a single write
    ///
    /// An unreadable existing history is reported rather than overwritten.
    pub fn append_all(&self, records: &[ErrorRecord]) -> Result<(), LearningError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut document = self.load_document()?;
        document.errors.extend_from_slice(records);
        document.last_update = Some(Utc::now());

        let json = serde_json::to_string_pretty(&document).map_err(|e| LearningError::Corrupt {
            location: self.store.location(),
            source: e,
        })?;
        self.store.write(&json)
    }

    /// Number of records per category
    pub fn category_counts(&self) -> Result<BTreeMap<ErrorCategory, usize>, LearningError> {
        let mut counts = BTreeMap::new();
        for record in self.load()? {
            *counts.entry(record.category).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::store::MemoryStore;

    fn history() -> (Arc<MemoryStore>, ErrorHistory) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), ErrorHistory::new(store))
    }

    #[test]
    fn test_missing_history_is_empty() {
        let (_, history) = history();
        assert!(history.load().unwrap().is_empty());
        assert!(history.load_document().unwrap().last_update.is_none());
    }

    #[test]
    fn test_append_preserves_order_and_sets_last_update() {
        let (_, history) = history();
        history
            .append(ErrorRecord::new("first", ErrorCategory::Other, "a", "b"))
            .unwrap();
        history
            .append(ErrorRecord::new("second", ErrorCategory::SyntaxError, "b", "c"))
            .unwrap();

        let document = history.load_document().unwrap();
        let messages: Vec<_> = document.errors.iter().map(|r| r.error_message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        let last_update = document.last_update.unwrap();
        assert!(last_update >= document.errors[1].timestamp);
    }

    #[test]
    fn test_corrupt_history_is_reported() {
        let store = Arc::new(MemoryStore::with_contents("{ not json"));
        let history = ErrorHistory::new(store.clone());

        assert!(matches!(history.load(), Err(LearningError::Corrupt { .. })));
        // Appending must not clobber the unreadable document
        assert!(history
            .append(ErrorRecord::new("x", ErrorCategory::Other, "", ""))
            .is_err());
        assert_eq!(store.contents().as_deref(), Some("{ not json"));
    }

    #[test]
    fn test_document_uses_legacy_field_names() {
        let (store, history) = history();
        history
            .append(ErrorRecord::new(
                "Index exceeds matrix dimensions",
                ErrorCategory::ArrayBounds,
                "x(4)",
                "x(min(4,end))",
            ))
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&store.contents().unwrap()).unwrap();
        let entry = &value["errors"][0];
        assert_eq!(entry["error_type"], "array_bounds");
        assert_eq!(entry["original_code"], "x(4)");
        assert_eq!(entry["fixed_code"], "x(min(4,end))");
        assert!(value["last_update"].is_string());
    }

    /// Histories with offset-less timestamps load and keep accepting appends
    #[test]
    fn test_naive_timestamps_are_read_as_utc() {
        let store = Arc::new(MemoryStore::with_contents(
            r#"{"errors": [{"timestamp": "2025-03-01T10:15:30.123456",
                "error_message": "Undefined function foo",
                "error_type": "undefined_variable",
                "original_code": "y = foo(1);",
                "fixed_code": "foo = @(x) x; y = foo(1);"}],
              "last_update": "2025-03-01T10:15:30.123999"}"#,
        ));
        let history = ErrorHistory::new(store.clone());

        let document = history.load_document().unwrap();
        assert_eq!(document.errors.len(), 1);
        assert_eq!(
            document.errors[0].timestamp.to_rfc3339(),
            "2025-03-01T10:15:30.123456+00:00"
        );
        assert_eq!(document.errors[0].category, ErrorCategory::UndefinedVariable);
        assert!(document.last_update.is_some());

        history
            .append(ErrorRecord::new("Invalid syntax", ErrorCategory::SyntaxError, "a", "b"))
            .unwrap();
        let records = history.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].error_message, "Undefined function foo");
    }

    #[test]
    fn test_empty_document_with_null_last_update() {
        let store = Arc::new(MemoryStore::with_contents(r#"{"errors": [], "last_update": null}"#));
        let document = ErrorHistory::new(store).load_document().unwrap();
        assert!(document.errors.is_empty());
        assert!(document.last_update.is_none());
    }

    #[test]
    fn test_timestamp_parsing() {
        assert!(timestamp::parse("2025-03-01T10:15:30").is_some());
        assert!(timestamp::parse("2025-03-01T10:15:30.5+02:00").is_some());
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_category_counts() {
        let (_, history) = history();
        history
            .append_all(&[
                ErrorRecord::new("a", ErrorCategory::SyntaxError, "", ""),
                ErrorRecord::new("b", ErrorCategory::SyntaxError, "", ""),
                ErrorRecord::new("c", ErrorCategory::Other, "", ""),
            ])
            .unwrap();

        let counts = history.category_counts().unwrap();
        assert_eq!(counts[&ErrorCategory::SyntaxError], 2);
        assert_eq!(counts[&ErrorCategory::Other], 1);
    }
}
