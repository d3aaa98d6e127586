//! Execution/validation engine interface
//!
//! The controller only talks to a [`SimulationEngine`]; the MATLAB-backed
//! implementation lives in [`matlab`].
//!
//! # Architecture
//!
//! ```text
//! RepairAgent ──validate(code)──► SimulationEngine ──► ["[Line N] msg", ...]
//!             ──execute(code)───►                  ──► (message, ExecutionResult)
//!             ──shutdown()──────►                      (idempotent)
//! ```

pub mod diagnostics;
pub mod matlab;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

pub use diagnostics::{normalize, Diagnostic, NO_ISSUES};
pub use matlab::MatlabEngine;

/// Message used whenever the engine is not running
pub const ENGINE_UNAVAILABLE: &str = "MATLAB Engine not available.";

/// Settings for the engine process
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine executable (resolved through `PATH` when not a path)
    pub command: String,
    /// Start the engine at session start; when false every call reports
    /// the engine as unavailable
    pub startup: bool,
    /// Directory that receives scripts and per-run result directories
    pub results_root: PathBuf,
    /// Upper bound for one engine call; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "matlab".to_string(),
            startup: true,
            results_root: std::env::temp_dir().join("simforge"),
            timeout_secs: None,
        }
    }
}

/// Outcome of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Name of the script the engine ran
    pub script_executed: Option<String>,
    /// Console transcript produced by the run
    pub output: Option<PathBuf>,
    /// Figure saved from the run
    pub figure: Option<PathBuf>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Human-readable message plus the structured result
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub message: String,
    pub result: ExecutionResult,
}

impl ExecutionReport {
    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            result: ExecutionResult::failure(error),
        }
    }
}

/// Error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{}", ENGINE_UNAVAILABLE)]
    Unavailable,
    #[error("No code to validate.")]
    NoCode,
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine call failed: {0}")]
    Command(String),
    #[error("engine call timed out after {0}s")]
    Timeout(u64),
}

/// Numerical engine that can lint and run generated code
///
/// Calls for one session are issued strictly one at a time.
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    fn is_available(&self) -> bool;

    /// Lint `code`; a clean result is either an empty list or [`NO_ISSUES`]
    async fn validate(&self, code: &str) -> Result<Vec<String>, EngineError>;

    /// Run `code`; failures are reported inside the report, never raised
    async fn execute(&self, code: &str) -> ExecutionReport;

    /// Release the engine; calling it again is a no-op
    async fn shutdown(&self);
}
