use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

use simforge::agent::{AgentConfig, RepairAgent, RepairOutcome};
use simforge::config::{SessionConfig, Verbosity};
use simforge::engine::{EngineConfig, MatlabEngine, ENGINE_UNAVAILABLE};
use simforge::learning::{ErrorHistory, ErrorLearner, FileStore, PromptDocument};
use simforge::llm::{ChatApi, ChatGenerator, GeneratorConfig, ProgressFn};
use simforge::metrics;
use simforge::tracing::{init_tracing, shutdown_tracing};

const LANGUAGE: &str = "MATLAB";

#[derive(Parser, Debug)]
#[command(
    name = "simforge",
    about = "Generate, validate, run, and repair MATLAB simulations with an LLM",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Do not start the MATLAB engine (generation only)
    #[arg(long, global = true)]
    no_engine: bool,

    /// System prompt document
    #[arg(long, env = "SIMFORGE_PROMPT_PATH", default_value = ".matlab_ai_prompt", global = true)]
    prompt_path: PathBuf,

    /// Error history document
    #[arg(long, env = "SIMFORGE_HISTORY_PATH", default_value = "error_history.json", global = true)]
    history_path: PathBuf,

    /// Chat API flavour of the LLM endpoint
    #[arg(long, value_enum, default_value_t = Backend::OpenAi, global = true)]
    backend: Backend,

    /// Base URL of the LLM endpoint (defaults per backend)
    #[arg(long, env = "SIMFORGE_LLM_URL", global = true)]
    llm_url: Option<String>,

    /// Model name
    #[arg(long, env = "SIMFORGE_MODEL", default_value = "gpt-4o-mini", global = true)]
    model: String,

    /// API key for the LLM endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// MATLAB executable
    #[arg(long, default_value = "matlab", global = true)]
    engine_command: String,

    /// Where scripts and run results are written (defaults to the system temp dir)
    #[arg(long, global = true)]
    results_dir: Option<PathBuf>,

    /// Per-call engine timeout in seconds
    #[arg(long, global = true)]
    engine_timeout: Option<u64>,

    /// Export spans to this OTLP endpoint (e.g. http://localhost:4317)
    #[arg(long, global = true)]
    otlp_endpoint: Option<String>,

    /// Print Prometheus metrics when the command finishes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Describe a simulation and iterate on it (default)
    Interactive,
    /// Write the default system prompt document
    GeneratePrompt {
        /// Overwrite an existing document
        #[arg(long)]
        force: bool,
    },
    /// Execute an existing MATLAB file
    Execute { file: PathBuf },
    /// Show recorded errors
    History {
        /// Number of recent records to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Backend {
    #[value(name = "openai")]
    OpenAi,
    Ollama,
}

impl Cli {
    fn session(&self) -> SessionConfig {
        SessionConfig {
            verbose: self.verbose,
            quiet: self.quiet,
            engine_startup: !self.no_engine,
        }
    }

    fn generator_config(&self) -> GeneratorConfig {
        let (backend, default_url) = match self.backend {
            Backend::OpenAi => (ChatApi::OpenAi, "https://api.openai.com/v1"),
            Backend::Ollama => (ChatApi::Ollama, "http://localhost:11434"),
        };
        GeneratorConfig {
            backend,
            base_url: self.llm_url.clone().unwrap_or_else(|| default_url.to_string()),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            language: LANGUAGE.to_string(),
            ..GeneratorConfig::default()
        }
    }

    fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            command: self.engine_command.clone(),
            startup: self.session().engine_startup,
            results_root: self.results_dir.clone().unwrap_or(defaults.results_root),
            timeout_secs: self.engine_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session = cli.session();

    init_tracing(&session, cli.otlp_endpoint.as_deref())
        .map_err(|e| anyhow!("failed to initialize tracing: {}", e))?;
    debug!(command = ?cli.command, verbose = cli.verbose, quiet = cli.quiet, "CLI initialized");

    let start = Instant::now();
    let result = match cli.command.clone().unwrap_or(Command::Interactive) {
        Command::Interactive => interactive(&cli).await,
        Command::GeneratePrompt { force } => generate_prompt(&cli, force),
        Command::Execute { file } => execute_file(&cli, &file).await,
        Command::History { limit } => show_history(&cli, limit),
    };
    info!(elapsed_secs = start.elapsed().as_secs_f64(), "Command finished");

    if cli.metrics {
        print!("{}", metrics::render());
    }
    shutdown_tracing();
    result
}

fn build_agent(cli: &Cli) -> RepairAgent {
    let session = cli.session();
    let verbosity = session.verbosity();

    let agent = RepairAgent::new(
        AgentConfig {
            session,
            language: LANGUAGE.to_string(),
        },
        Box::new(ChatGenerator::new(cli.generator_config())),
        Box::new(MatlabEngine::start(cli.engine_config())),
        ErrorLearner::with_files(&cli.prompt_path, &cli.history_path),
    );

    if verbosity >= Verbosity::Normal {
        let progress: Arc<ProgressFn> = Arc::new(|percent: u8| {
            eprint!("\r  [{:<20}] {:>3}%", "#".repeat(percent as usize / 5), percent);
            if percent >= 100 {
                eprintln!();
            }
        });
        agent.with_progress(progress)
    } else {
        agent
    }
}

async fn interactive(cli: &Cli) -> Result<()> {
    if matches!(cli.backend, Backend::OpenAi) && cli.api_key.is_none() {
        bail!(
            "OPENAI_API_KEY not found in environment variables. \
             Set it, pass --api-key, or use --backend ollama."
        );
    }

    if !cli.quiet {
        println!("\n{}", "=".repeat(50));
        println!(" 🚀 {} simulation agent", LANGUAGE);
        println!("{}", "=".repeat(50));
    }

    let mut agent = build_agent(cli);
    let mut console = Console::new();

    println!("\nDescribe the simulation ODE you would like to generate.");
    println!("Example: 'A system mass-spring with damping'");
    let Some(description) = console.ask("\nDescribe the simulation ODE: ").await? else {
        agent.shutdown().await;
        return Ok(());
    };

    if let Err(e) = agent.generate_code(&description).await {
        agent.shutdown().await;
        return Err(e).context("initial code generation failed");
    }
    show_code(&format!("{} code generated:", LANGUAGE), agent.code().unwrap_or_default());

    loop {
        println!("\nWhat would you like to do?");
        println!("1. Validate code");
        println!("2. Execute simulation");
        println!("3. Modify/improve the code");
        println!("4. Save code to file");
        println!("5. Exit");

        let choice = match console.ask("Choose an option [5]: ").await? {
            None => "5".to_string(),
            Some(choice) if choice.is_empty() => "5".to_string(),
            Some(choice) => choice,
        };
        debug!(choice = %choice, "Menu selection");

        match choice.as_str() {
            "1" => {
                if !agent.engine_available() {
                    println!("\n❌ {}", ENGINE_UNAVAILABLE);
                    continue;
                }
                match agent.validate().await {
                    Ok(diagnostics) if diagnostics.is_empty() => println!("\n✅ No issues found!"),
                    Ok(diagnostics) => {
                        println!("\nIssues found:");
                        for diagnostic in &diagnostics {
                            println!("  {}", diagnostic);
                        }
                        if console.confirm("\nAttempt to fix issues automatically?").await? {
                            let outcome = agent.repair_diagnostics().await;
                            print_repair(outcome);
                        }
                    }
                    Err(e) => println!("\n❌ Validation failed: {}", e),
                }
            }
            "2" => {
                if !agent.engine_available() {
                    println!("\n❌ {}", ENGINE_UNAVAILABLE);
                    continue;
                }
                let report = agent.execute().await?;
                println!("\n{}\n", report.message);
                if let Some(output) = &report.result.output {
                    println!("Output saved to: {}", output.display());
                }
                if !report.result.success
                    && console.confirm("\nAttempt to fix execution issues?").await?
                {
                    let outcome = agent.repair_execution().await;
                    print_repair(outcome);
                }
            }
            "3" => {
                let Some(instruction) = console
                    .ask("\nHow would you like to modify/improve the code? ")
                    .await?
                else {
                    continue;
                };
                if instruction.is_empty() {
                    continue;
                }
                match agent.refine_code(&instruction).await {
                    Ok(code) => show_code("Updated code:", &code),
                    Err(e) => println!("\n❌ {}", e),
                }
            }
            "4" => {
                let filename = match console
                    .ask("Enter filename to save [matlab_simulation.m]: ")
                    .await?
                {
                    Some(name) if !name.is_empty() => name,
                    _ => "matlab_simulation.m".to_string(),
                };
                let code = agent.code().unwrap_or_default();
                match tokio::fs::write(&filename, code).await {
                    Ok(()) => {
                        info!(path = %filename, "Code saved");
                        println!("\nCode saved to {}", filename);
                    }
                    Err(e) => println!("❌ Failed to save: {}", e),
                }
            }
            "5" => {
                agent.shutdown().await;
                println!("\nThank you for using simforge!");
                break;
            }
            other => println!("\nInvalid choice '{}'. Please try again.", other),
        }
    }

    Ok(())
}

fn print_repair(outcome: Result<RepairOutcome, simforge::agent::AgentError>) {
    match outcome {
        Ok(outcome) => {
            show_code("Updated code:", &outcome.code);
            if let Some(learning) = outcome.learning {
                if learning.prompt_updated() {
                    println!(
                        "Learned {} new prevention rule(s).",
                        learning.rules_added.len()
                    );
                }
            }
        }
        Err(e) => println!("\n❌ {}", e),
    }
}

fn generate_prompt(cli: &Cli, force: bool) -> Result<()> {
    let document = PromptDocument::new(Arc::new(FileStore::new(&cli.prompt_path)));
    if document.exists()? && !force {
        println!(
            "{} already exists. Use --force to overwrite.",
            cli.prompt_path.display()
        );
        return Ok(());
    }

    document.write_default()?;
    info!(path = %cli.prompt_path.display(), "Prompt document written");
    println!("✅ Prompt created at: {}", cli.prompt_path.display());
    Ok(())
}

async fn execute_file(cli: &Cli, file: &Path) -> Result<()> {
    let code = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut agent = build_agent(cli);
    if !agent.engine_available() {
        bail!(ENGINE_UNAVAILABLE);
    }

    println!("\nExecuting {}...", file.display());
    agent.load_code(code);
    let report = agent.execute().await;
    agent.shutdown().await;

    let report = report?;
    if !report.result.success {
        bail!(report.message);
    }
    println!("\n{}", report.message);
    if let Some(figure) = &report.result.figure {
        println!("Figure saved to: {}", figure.display());
    }
    Ok(())
}

fn show_history(cli: &Cli, limit: usize) -> Result<()> {
    let history = ErrorHistory::new(Arc::new(FileStore::new(&cli.history_path)));
    let document = history.load_document()?;

    if document.errors.is_empty() {
        println!("No errors recorded in {}.", cli.history_path.display());
        return Ok(());
    }

    println!("{} errors recorded", document.errors.len());
    if let Some(updated) = document.last_update {
        println!("Last update: {}", updated.to_rfc3339());
    }

    println!("\nBy category:");
    for (category, count) in history.category_counts()? {
        println!("  {:<20} {}", category, count);
    }

    println!("\nMost recent:");
    let skip = document.errors.len().saturating_sub(limit);
    for record in document.errors.iter().skip(skip) {
        println!(
            "  {}  {:<20} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.category,
            record.error_message.lines().next().unwrap_or_default()
        );
    }
    Ok(())
}

fn show_code(title: &str, code: &str) {
    println!("\n{}", title);
    println!("┌─────────────────────────────────────────");
    for line in code.lines() {
        println!("│ {}", line);
    }
    println!("└─────────────────────────────────────────");
}

/// Line-oriented prompts on stdin
struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// `None` once stdin is closed
    async fn ask(&mut self, question: &str) -> Result<Option<String>> {
        print!("{}", question);
        std::io::stdout().flush()?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    async fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/N]: ", question)).await?;
        Ok(matches!(
            answer.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("y") | Some("yes")
        ))
    }
}
