//! Whole-document storage for the prompt and the error history
//!
//! Both persistent documents are read and written in full. Keeping that
//! behind [`DocumentStore`] lets the repair loop run against an in-memory
//! store in tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::LearningError;

/// Read-full / write-full access to one document
pub trait DocumentStore: Send + Sync {
    /// Current contents, or `None` when the document has never been written
    fn read(&self) -> Result<Option<String>, LearningError>;

    /// Replace the document; either the new contents land or the old stay
    fn write(&self, contents: &str) -> Result<(), LearningError>;

    /// Human-readable location for messages
    fn location(&self) -> String;
}

/// Document stored in a single file on disk
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file used for atomic replacement
    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let suffix = uuid::Uuid::now_v7().simple().to_string();
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, &suffix[suffix.len() - 8..]))
    }
}

impl DocumentStore for FileStore {
    fn read(&self) -> Result<Option<String>, LearningError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LearningError::Read {
                location: self.location(),
                source: e,
            }),
        }
    }

    fn write(&self, contents: &str) -> Result<(), LearningError> {
        let write_err = |e| LearningError::Write {
            location: self.location(),
            source: e,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let staging = self.staging_path();
        std::fs::write(&staging, contents).map_err(write_err)?;
        if let Err(e) = std::fs::rename(&staging, &self.path) {
            let _ = std::fs::remove_file(&staging);
            return Err(write_err(e));
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Document held in memory; used by tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
        }
    }

    /// Snapshot of the stored document
    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self) -> Result<Option<String>, LearningError> {
        Ok(self.contents())
    }

    fn write(&self, contents: &str) -> Result<(), LearningError> {
        *self
            .contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(contents.to_string());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}
