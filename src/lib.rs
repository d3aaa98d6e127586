//! simforge - LLM-driven MATLAB simulation authoring with error learning
//!
//! A session asks a chat model for simulation code, lints and runs it in a
//! MATLAB engine, and on request feeds failures back for a fix. Every
//! repaired error is classified, recorded in a persistent history, and may
//! add a prevention rule to section 8 of the system prompt used by later
//! sessions.
//!
//! # Modules
//!
//! - `agent` - Repair loop controller and session conversation
//! - `llm` - Chat client and code generator
//! - `engine` - Validation/execution engine interface and MATLAB backend
//! - `learning` - Error classification, prevention rules, prompt and history documents
//! - `config` - Per-session settings
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - Logging and optional OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use simforge::agent::{AgentConfig, RepairAgent};
//! use simforge::engine::{EngineConfig, MatlabEngine};
//! use simforge::learning::ErrorLearner;
//! use simforge::llm::{ChatGenerator, GeneratorConfig};
//!
//! let mut agent = RepairAgent::new(
//!     AgentConfig::default(),
//!     Box::new(ChatGenerator::new(GeneratorConfig::default())),
//!     Box::new(MatlabEngine::start(EngineConfig::default())),
//!     ErrorLearner::with_files(".matlab_ai_prompt", "error_history.json"),
//! );
//!
//! agent.generate_code("A damped mass-spring system").await?;
//! if !agent.validate().await?.is_empty() {
//!     agent.repair_diagnostics().await?;
//! }
//! agent.shutdown().await;
//! ```

pub mod agent;
pub mod config;
pub mod engine;
pub mod learning;
pub mod llm;
pub mod metrics;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, RepairAgent};
pub use config::SessionConfig;
pub use learning::{ErrorCategory, ErrorLearner};
