//! Repair loop controller
//!
//! The RepairAgent owns one authoring session: it asks the generator for
//! code, runs it through the engine, and on explicit request feeds the
//! resulting errors back for a fix while the learner turns them into
//! prompt rules.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::conversation::{code_turn, Conversation, ConversationTurn};
use crate::config::{SessionConfig, Verbosity};
use crate::engine::{
    normalize, Diagnostic, EngineError, ExecutionReport, SimulationEngine, ENGINE_UNAVAILABLE,
};
use crate::learning::{ErrorLearner, LearningReport, DEFAULT_PROMPT};
use crate::llm::{CodeGenerator, GenerationError, ProgressFn, ProgressReporter};
use crate::metrics::{EXECUTIONS, REPAIRS, VALIDATIONS};

/// Configuration for the repair agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Verbosity and engine startup for this session
    pub session: SessionConfig,
    /// Language named in conversation turns and narration
    pub language: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            language: "MATLAB".to_string(),
        }
    }
}

/// Where the session is in the generate/check/repair cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No code yet
    Idle,
    Generated,
    Validated,
    Executed,
    /// Session ended; the engine has been released
    Terminal,
}

/// Result of a repair request
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// Current code after the repair
    pub code: String,
    /// What the learner recorded; `None` when there was nothing to repair
    pub learning: Option<LearningReport>,
}

/// Error type for agent operations
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("No code has been generated yet.")]
    NoCode,
    #[error("code generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Controller for one authoring session
pub struct RepairAgent {
    config: AgentConfig,
    generator: Box<dyn CodeGenerator>,
    engine: Box<dyn SimulationEngine>,
    /// False when the session opted out of engine startup
    engine_enabled: bool,
    learner: ErrorLearner,
    conversation: Conversation,
    code: Option<String>,
    state: SessionState,
    last_diagnostics: Vec<Diagnostic>,
    last_execution: Option<ExecutionReport>,
    session_id: String,
    progress: Option<Arc<ProgressFn>>,
}

impl RepairAgent {
    /// Create a new agent
    ///
    /// # Arguments
    /// * `config` - Session and language settings
    /// * `generator` - Service that writes and fixes code
    /// * `engine` - Engine that lints and runs code
    /// * `learner` - Prompt and history persistence for learned rules
    pub fn new(
        config: AgentConfig,
        generator: Box<dyn CodeGenerator>,
        engine: Box<dyn SimulationEngine>,
        learner: ErrorLearner,
    ) -> Self {
        let session_id = Uuid::now_v7().to_string();
        let engine_enabled = config.session.engine_startup;
        let agent = Self {
            config,
            generator,
            engine,
            engine_enabled,
            learner,
            conversation: Conversation::new(),
            code: None,
            state: SessionState::Idle,
            last_diagnostics: Vec::new(),
            last_execution: None,
            session_id,
            progress: None,
        };

        info!(session_id = %agent.session_id, engine_available = agent.engine_available(), "Session started");
        if agent.engine_available() {
            agent.narrate(format!("{} Engine started successfully.", agent.config.language));
        } else {
            agent.narrate(format!(
                "{} Engine not available. Code will be generated but not executed.",
                agent.config.language
            ));
        }
        agent
    }

    /// Report progress of generate/fix/execute calls to `progress`
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn last_diagnostics(&self) -> &[Diagnostic] {
        &self.last_diagnostics
    }

    pub fn last_execution(&self) -> Option<&ExecutionReport> {
        self.last_execution.as_ref()
    }

    pub fn learner(&self) -> &ErrorLearner {
        &self.learner
    }

    /// Whether validate/execute reach the engine
    ///
    /// A session started with `engine_startup == false` never uses the
    /// engine, even one that is running.
    pub fn engine_available(&self) -> bool {
        self.engine_enabled && self.engine.is_available()
    }

    /// Append a turn to the conversation replayed on the next generation
    pub fn add_message(&mut self, turn: ConversationTurn) {
        self.conversation.push(turn);
    }

    /// Use existing code as the session's current code
    pub fn load_code(&mut self, code: impl Into<String>) {
        self.code = Some(code.into());
        self.state = SessionState::Generated;
        self.last_diagnostics.clear();
        self.last_execution = None;
    }

    /// Generate fresh code for a natural-language description
    pub async fn generate_code(&mut self, prompt: &str) -> Result<String, AgentError> {
        let turn = ConversationTurn::user(prompt);
        let heading = format!("Generated {} code", self.config.language);
        self.generate_with(prompt, turn, heading).await
    }

    /// Regenerate the current code following a modification request
    pub async fn refine_code(&mut self, instruction: &str) -> Result<String, AgentError> {
        let turn = ConversationTurn::user(format!("Modify the code to: {}", instruction));
        let heading = format!("Updated {} code", self.config.language);
        self.generate_with(instruction, turn, heading).await
    }

    async fn generate_with(
        &mut self,
        prompt: &str,
        user_turn: ConversationTurn,
        heading: String,
    ) -> Result<String, AgentError> {
        let system_prompt = self.system_prompt();

        // The pending user turn is sent as context but only kept on success
        let mut context = self.conversation.turns().to_vec();
        context.push(user_turn.clone());

        let span = info_span!(
            "generate_code",
            session_id = %self.session_id,
            history = context.len(),
            otel.name = "generate_code"
        );

        self.narrate(format!("Generating {} code...", self.config.language));
        let result = self
            .generator
            .generate(&system_prompt, prompt, &context, self.progress.as_deref())
            .instrument(span)
            .await;

        let code = match result {
            Ok(code) => code,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Code generation failed");
                self.narrate(format!("❌ Code generation failed: {}", e));
                return Err(e.into());
            }
        };

        self.conversation.push(user_turn);
        self.conversation
            .push(code_turn(&heading, &self.config.language, &code));
        self.code = Some(code.clone());
        self.state = SessionState::Generated;
        self.last_diagnostics.clear();
        self.last_execution = None;

        info!(session_id = %self.session_id, chars = code.len(), "Code generation complete");
        self.narrate("Code generation complete.");
        Ok(code)
    }

    /// Lint the current code
    ///
    /// A clean run yields an empty list whether the engine reported nothing
    /// or its "no issues" sentinel.
    pub async fn validate(&mut self) -> Result<Vec<Diagnostic>, AgentError> {
        let code = self.current_code()?.to_string();

        let span = info_span!(
            "validate",
            session_id = %self.session_id,
            otel.name = "validate"
        );

        self.narrate(format!("Validating {} code...", self.config.language));
        let validated = if self.engine_enabled {
            self.engine.validate(&code).instrument(span).await
        } else {
            Err(EngineError::Unavailable)
        };
        let raw = match validated {
            Ok(raw) => raw,
            Err(e) => {
                VALIDATIONS.with_label_values(&["error"]).inc();
                warn!(session_id = %self.session_id, error = %e, "Validation failed");
                return Err(e.into());
            }
        };

        let diagnostics = normalize(&raw);
        self.state = SessionState::Validated;

        if diagnostics.is_empty() {
            VALIDATIONS.with_label_values(&["clean"]).inc();
            info!(session_id = %self.session_id, "Validation clean");
            self.narrate("✅ Validation successful: No errors or warnings.");
        } else {
            VALIDATIONS.with_label_values(&["issues"]).inc();
            info!(session_id = %self.session_id, issues = diagnostics.len(), "Validation found issues");
            self.narrate(format!("⚠️ Validation found {} issues.", diagnostics.len()));
        }

        self.last_diagnostics = diagnostics.clone();
        Ok(diagnostics)
    }

    /// Run the current code
    ///
    /// Engine failures, including an unavailable engine, come back inside
    /// the report.
    pub async fn execute(&mut self) -> Result<ExecutionReport, AgentError> {
        let code = self.current_code()?.to_string();

        let span = info_span!(
            "execute",
            session_id = %self.session_id,
            code_len = code.len(),
            otel.name = "execute"
        );

        self.narrate(format!("Executing {} simulation...", self.config.language));
        let report = {
            let progress = ProgressReporter::new(self.progress.as_deref());
            progress.report(10);
            let report = if self.engine_enabled {
                self.engine.execute(&code).instrument(span).await
            } else {
                ExecutionReport::failed(ENGINE_UNAVAILABLE, ENGINE_UNAVAILABLE)
            };
            progress.report(100);
            report
        };

        if report.result.success {
            EXECUTIONS.with_label_values(&["success"]).inc();
            info!(session_id = %self.session_id, figure = ?report.result.figure, "Execution succeeded");
            self.narrate("✅ Simulation executed successfully.");
            if let Some(figure) = &report.result.figure {
                self.narrate(format!("Figure saved to: {}", figure.display()));
            }
        } else {
            EXECUTIONS.with_label_values(&["failure"]).inc();
            warn!(session_id = %self.session_id, error = ?report.result.error, "Execution failed");
            self.narrate(format!("❌ Simulation execution failed: {}", report.message));
        }

        self.state = SessionState::Executed;
        self.last_execution = Some(report.clone());
        Ok(report)
    }

    /// Ask the generator to fix the current code for `errors`
    ///
    /// An empty list returns the current code without calling the generator.
    pub async fn fix_code(&mut self, errors: &[String]) -> Result<RepairOutcome, AgentError> {
        self.repair(errors, "manual").await
    }

    /// Repair using the diagnostics of the last validation
    pub async fn repair_diagnostics(&mut self) -> Result<RepairOutcome, AgentError> {
        let errors: Vec<String> = self.last_diagnostics.iter().map(ToString::to_string).collect();
        let outcome = self.repair(&errors, "validation").await?;
        self.state = SessionState::Validated;
        Ok(outcome)
    }

    /// Repair using the error of the last failed execution
    pub async fn repair_execution(&mut self) -> Result<RepairOutcome, AgentError> {
        let errors: Vec<String> = match &self.last_execution {
            Some(report) if !report.result.success => vec![report
                .result
                .error
                .clone()
                .unwrap_or_else(|| report.message.clone())],
            _ => Vec::new(),
        };
        let outcome = self.repair(&errors, "execution").await?;
        self.state = SessionState::Executed;
        Ok(outcome)
    }

    async fn repair(
        &mut self,
        errors: &[String],
        trigger: &'static str,
    ) -> Result<RepairOutcome, AgentError> {
        let before = self.current_code()?.to_string();
        if errors.is_empty() {
            debug!(session_id = %self.session_id, "Nothing to repair");
            return Ok(RepairOutcome {
                code: before,
                learning: None,
            });
        }

        REPAIRS.with_label_values(&[trigger]).inc();
        let span = info_span!(
            "repair",
            session_id = %self.session_id,
            trigger,
            errors = errors.len(),
            otel.name = "repair"
        );

        self.narrate("Attempting to fix code...");
        let fixed = self
            .generator
            .fix(&before, errors, self.progress.as_deref())
            .instrument(span.clone())
            .await;

        match fixed {
            Ok(code) => {
                // Earlier checks describe the replaced code
                self.code = Some(code.clone());
                self.last_diagnostics.clear();
                self.last_execution = None;
                let learning = span.in_scope(|| self.learner.learn(errors, &before, &code));
                self.report_learning(&learning);
                info!(session_id = %self.session_id, trigger, "Code fixing complete");
                self.narrate("Code fixing complete.");
                Ok(RepairOutcome {
                    code,
                    learning: Some(learning),
                })
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Code fixing failed; keeping current code");
                let learning = span.in_scope(|| self.learner.learn(errors, &before, &before));
                self.report_learning(&learning);
                self.narrate(format!("❌ Code fixing failed: {}", e));
                Err(e.into())
            }
        }
    }

    /// Release the engine and end the session; safe to call twice
    pub async fn shutdown(&mut self) {
        if self.state == SessionState::Terminal {
            return;
        }
        if self.engine_available() {
            self.narrate(format!("Shutting down {} Engine...", self.config.language));
        }
        self.engine.shutdown().await;
        self.state = SessionState::Terminal;
        info!(session_id = %self.session_id, "Session ended");
    }

    fn current_code(&self) -> Result<&str, AgentError> {
        self.code.as_deref().ok_or(AgentError::NoCode)
    }

    fn system_prompt(&self) -> String {
        match self.learner.prompt().load_or_init() {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    location = %self.learner.prompt().location(),
                    error = %e,
                    "Using built-in system prompt"
                );
                DEFAULT_PROMPT.to_string()
            }
        }
    }

    fn report_learning(&self, report: &LearningReport) {
        for rule in &report.rules_added {
            self.narrate_detail(format!("Learned rule: {}", rule));
        }
        for failure in &report.failures {
            self.narrate(format!("⚠️ Learning step skipped: {}", failure));
        }
    }

    fn narrate(&self, message: impl Display) {
        if self.config.session.verbosity() >= Verbosity::Normal {
            println!("[AGENT] {}", message);
        }
    }

    fn narrate_detail(&self, message: impl Display) {
        if self.config.session.verbosity() >= Verbosity::Verbose {
            println!("[AGENT] {}", message);
        }
    }
}
