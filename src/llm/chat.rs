//! Chat-completion client
//!
//! Speaks either Ollama's native `/api/chat` or the OpenAI-compatible
//! `/chat/completions` endpoint. Both take the same ordered message list
//! and return the assistant's text.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Wire protocol of the chat endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatApi {
    /// Ollama `/api/chat`
    Ollama,
    /// OpenAI-compatible `/chat/completions`
    #[default]
    OpenAi,
}

/// Sampling settings for one request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2000,
        }
    }
}

/// Response from Ollama's /api/chat
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

/// Response from /chat/completions
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Error type for chat operations
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Chat endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Empty response from chat endpoint")]
    EmptyResponse,
}

/// Client for a chat-completion endpoint
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    api: ChatApi,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - e.g. "http://localhost:11434" or "https://api.openai.com/v1"
    /// * `api` - which wire protocol the endpoint speaks
    pub fn new(base_url: impl Into<String>, api: ChatApi) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api,
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send a bearer token with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn api(&self) -> ChatApi {
        self.api
    }

    /// Full URL the client posts to
    pub fn endpoint(&self) -> String {
        match self.api {
            ChatApi::Ollama => format!("{}/api/chat", self.base_url),
            ChatApi::OpenAi => format!("{}/chat/completions", self.base_url),
        }
    }

    /// Request body for `messages`
    pub fn request_body(
        &self,
        messages: &[ChatMessage],
        model: &str,
        sampling: Sampling,
    ) -> serde_json::Value {
        match self.api {
            ChatApi::Ollama => json!({
                "model": model,
                "messages": messages,
                "stream": false,
                "options": {
                    "temperature": sampling.temperature,
                    "num_predict": sampling.max_tokens,
                }
            }),
            ChatApi::OpenAi => json!({
                "model": model,
                "messages": messages,
                "temperature": sampling.temperature,
                "max_tokens": sampling.max_tokens,
            }),
        }
    }

    /// Send a chat request and return the assistant's reply text
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        sampling: Sampling,
    ) -> Result<String, ChatError> {
        let body = self.request_body(messages, model, sampling);

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        self.parse_reply(&text)
    }

    /// Extract the assistant text from a raw response body
    pub fn parse_reply(&self, text: &str) -> Result<String, ChatError> {
        let content = match self.api {
            ChatApi::Ollama => serde_json::from_str::<OllamaResponse>(text)?.message.content,
            ChatApi::OpenAi => serde_json::from_str::<CompletionResponse>(text)?
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default(),
        };

        if content.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let ollama = ChatClient::new("http://localhost:11434/", ChatApi::Ollama);
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/chat");

        let openai = ChatClient::new("https://api.openai.com/v1", ChatApi::OpenAi);
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_ollama_body_disables_streaming() {
        let client = ChatClient::new("http://localhost:11434", ChatApi::Ollama);
        let body = client.request_body(&[ChatMessage::user("hi")], "llama3.2", Sampling::default());

        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 2000);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_openai_body() {
        let client = ChatClient::new("http://x", ChatApi::OpenAi);
        let body = client.request_body(
            &[ChatMessage::system("s"), ChatMessage::user("u")],
            "gpt-4o-mini",
            Sampling::default(),
        );

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_replies() {
        let ollama = ChatClient::new("http://x", ChatApi::Ollama);
        let reply = ollama
            .parse_reply(r#"{"message":{"role":"assistant","content":"x = 1;"},"done":true}"#)
            .unwrap();
        assert_eq!(reply, "x = 1;");

        let openai = ChatClient::new("http://x", ChatApi::OpenAi);
        let reply = openai
            .parse_reply(r#"{"choices":[{"message":{"role":"assistant","content":"y = 2;"}}]}"#)
            .unwrap();
        assert_eq!(reply, "y = 2;");

        assert!(matches!(
            openai.parse_reply(r#"{"choices":[]}"#),
            Err(ChatError::EmptyResponse)
        ));
        assert!(matches!(openai.parse_reply("not json"), Err(ChatError::Parse(_))));
    }
}
