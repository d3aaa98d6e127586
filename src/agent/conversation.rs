//! Conversation context replayed to the generator

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of the session conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            Role::User => ChatMessage::user(self.content.clone()),
            Role::Assistant => ChatMessage::assistant(self.content.clone()),
        }
    }
}

/// Ordered, append-only list of turns for one session
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Assistant turn carrying `code` in a fenced block
pub fn code_turn(heading: &str, language: &str, code: &str) -> ConversationTurn {
    ConversationTurn::assistant(format!(
        "{}:\n\n```{}\n{}\n```",
        heading,
        language.to_lowercase(),
        code
    ))
}
