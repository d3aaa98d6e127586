//! Code generation on top of a chat endpoint

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::chat::{ChatApi, ChatClient, ChatError, ChatMessage, Sampling};
use crate::agent::conversation::ConversationTurn;
use crate::metrics::{CODE_GENERATIONS, GENERATION_DURATION};

/// Progress callback; receives values in `[0, 100]`
pub type ProgressFn = dyn Fn(u8) + Send + Sync;

/// Forwards progress to an optional callback, never going backwards
pub struct ProgressReporter<'a> {
    sink: Option<&'a ProgressFn>,
    last: AtomicU8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: Option<&'a ProgressFn>) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
        }
    }

    /// Report `percent`, clamped to 100; values below the last one are dropped
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let Some(sink) = self.sink else {
            return;
        };
        if self.last.fetch_max(percent, Ordering::SeqCst) <= percent {
            sink(percent);
        }
    }
}

/// Error type for generation and fix calls
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("model returned no code")]
    EmptyCode,
    #[error("generation backend failed: {0}")]
    Backend(String),
}

/// Service that writes and repairs source code
///
/// Returned text never carries markdown fences.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Produce code for `prompt`, replaying `history` as prior context
    async fn generate(
        &self,
        system_prompt: &str,
        prompt: &str,
        history: &[ConversationTurn],
        progress: Option<&ProgressFn>,
    ) -> Result<String, GenerationError>;

    /// Correct `code` given the error messages it produced
    async fn fix(
        &self,
        code: &str,
        errors: &[String],
        progress: Option<&ProgressFn>,
    ) -> Result<String, GenerationError>;
}

/// Settings for [`ChatGenerator`]
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub backend: ChatApi,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub sampling: Sampling,
    /// Language named in generation requests
    pub language: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: ChatApi::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            sampling: Sampling::default(),
            language: "MATLAB".to_string(),
        }
    }
}

/// [`CodeGenerator`] backed by a chat-completion endpoint
pub struct ChatGenerator {
    client: ChatClient,
    config: GeneratorConfig,
}

impl ChatGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let mut client = ChatClient::new(config.base_url.clone(), config.backend);
        if let Some(key) = &config.api_key {
            client = client.with_api_key(key.clone());
        }
        Self { client, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn fix_system_prompt(&self) -> String {
        format!(
            "You are an expert {lang} programmer specializing in fixing code errors.\n\
             Correct the provided {lang} code based on the error messages.\n\
             Return ONLY the corrected code without explanations.",
            lang = self.config.language
        )
    }

    fn fix_request(&self, code: &str, errors: &[String]) -> String {
        format!(
            "The following {lang} code has errors:\n\n```{tag}\n{code}\n```\n\n\
             Error messages:\n{errors}\n\n\
             Please fix the code and return ONLY the corrected version.",
            lang = self.config.language,
            tag = self.config.language.to_lowercase(),
            code = code,
            errors = errors.join("\n"),
        )
    }

    /// One chat round trip with metrics, returning fence-free code
    async fn complete(
        &self,
        operation: &'static str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerationError> {
        let start = Instant::now();
        let result = self
            .client
            .chat(messages, &self.config.model, self.config.sampling)
            .await;
        GENERATION_DURATION
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(reply) => {
                let code = strip_code_fences(&reply);
                if code.is_empty() {
                    Err(GenerationError::EmptyCode)
                } else {
                    debug!(operation, chars = code.len(), "Received code");
                    Ok(code)
                }
            }
            Err(e) => Err(GenerationError::from(e)),
        };

        let label = if outcome.is_ok() { "success" } else { "error" };
        CODE_GENERATIONS.with_label_values(&[operation, label]).inc();
        if let Err(e) = &outcome {
            warn!(operation, error = %e, "Code generation call failed");
        }
        outcome
    }
}

#[async_trait]
impl CodeGenerator for ChatGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        prompt: &str,
        history: &[ConversationTurn],
        progress: Option<&ProgressFn>,
    ) -> Result<String, GenerationError> {
        let progress = ProgressReporter::new(progress);
        progress.report(10);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().map(ConversationTurn::to_chat_message));
        messages.push(ChatMessage::user(format!(
            "Generate {} code for: {}",
            self.config.language, prompt
        )));
        debug!(history = history.len(), model = %self.config.model, "Prepared generation request");
        progress.report(20);

        progress.report(30);
        let result = self.complete("generate", &messages).await;
        if result.is_ok() {
            progress.report(70);
            progress.report(90);
        }
        progress.report(100);
        result
    }

    async fn fix(
        &self,
        code: &str,
        errors: &[String],
        progress: Option<&ProgressFn>,
    ) -> Result<String, GenerationError> {
        let progress = ProgressReporter::new(progress);
        progress.report(10);

        let messages = [
            ChatMessage::system(self.fix_system_prompt()),
            ChatMessage::user(self.fix_request(code, errors)),
        ];
        progress.report(30);

        progress.report(40);
        let result = self.complete("fix", &messages).await;
        if result.is_ok() {
            progress.report(80);
        }
        progress.report(100);
        result
    }
}

/// Remove a surrounding markdown code fence, with or without a language tag
pub fn strip_code_fences(text: &str) -> String {
    let mut code = text.trim();

    if let Some(rest) = code.strip_prefix("```") {
        code = match rest.split_once('\n') {
            // "```matlab\n..." or "```\n..."
            Some((tag, body)) if !tag.trim().contains(char::is_whitespace) => body,
            _ => rest,
        };
    }
    if let Some(rest) = code.trim_end().strip_suffix("```") {
        code = rest;
    }

    code.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```matlab\nx = 1;\n```"), "x = 1;");
        assert_eq!(strip_code_fences("```octave\nx = 1;\n```\n"), "x = 1;");
        assert_eq!(strip_code_fences("```\nx = 1;\n```"), "x = 1;");
        assert_eq!(strip_code_fences("  x = 1;  "), "x = 1;");
        assert_eq!(strip_code_fences("```x = 1;```"), "x = 1;");
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |p: u8| seen.lock().unwrap().push(p)
        };
        let reporter = ProgressReporter::new(Some(&sink));

        for p in [10, 30, 20, 30, 250, 90] {
            reporter.report(p);
        }

        assert_eq!(*seen.lock().unwrap(), vec![10, 30, 30, 100]);
    }

    #[test]
    fn test_progress_without_sink() {
        ProgressReporter::new(None).report(50);
    }

    #[test]
    fn test_fix_request_lists_errors() {
        let generator = ChatGenerator::new(GeneratorConfig::default());
        let request = generator.fix_request(
            "x = y;",
            &["[Line 1] Undefined y".to_string(), "second".to_string()],
        );

        assert!(request.contains("```matlab\nx = y;\n```"));
        assert!(request.contains("[Line 1] Undefined y\nsecond"));
        assert!(generator.fix_system_prompt().contains("expert MATLAB programmer"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_full_progress() {
        let generator = ChatGenerator::new(GeneratorConfig {
            backend: ChatApi::Ollama,
            base_url: "http://127.0.0.1:9".to_string(),
            ..GeneratorConfig::default()
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |p: u8| seen.lock().unwrap().push(p)
        };

        let result = generator.generate("system", "a pendulum", &[], Some(&sink)).await;

        assert!(matches!(result, Err(GenerationError::Chat(_))));
        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30, 100]);
    }
}
