//! Agent module for the generate/validate/execute/repair loop
//!
//! # Architecture
//!
//! ```text
//! User prompt → RepairAgent ──generate()──► CodeGenerator (chat endpoint)
//!                   ↓
//!             validate() / execute() ──► SimulationEngine
//!                   ↓
//!             errors? (repair only when asked)
//!                   ↓
//!             CodeGenerator.fix(code, errors) → new code
//!                   ↓
//!             ErrorLearner.learn(errors, before, after)
//!                   ├─► prompt section 8 gains new rules
//!                   └─► error history gains one record per error
//! ```

pub mod controller;
pub mod conversation;

pub use controller::{AgentConfig, AgentError, RepairAgent, RepairOutcome, SessionState};
pub use conversation::{Conversation, ConversationTurn, Role};
