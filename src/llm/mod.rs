//! LLM integration
//!
//! [`chat`] talks to the HTTP endpoint; [`generator`] turns it into a
//! [`CodeGenerator`] that writes and fixes simulation code.

pub mod chat;
pub mod generator;

pub use chat::{ChatApi, ChatClient, ChatError, ChatMessage, Sampling};
pub use generator::{
    strip_code_fences, ChatGenerator, CodeGenerator, GenerationError, GeneratorConfig, ProgressFn,
    ProgressReporter,
};
