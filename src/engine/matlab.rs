//! MATLAB-backed engine
//!
//! Each call writes the code to a uniquely named script under the results
//! root and runs `matlab -batch` against it. Execution output goes to a
//! per-run `results_<id>` directory that is kept after the run:
//!
//! ```text
//! <results_root>/
//! ├── sim_script_<id>.m     (removed after the run)
//! └── results_<id>/
//!     ├── output.txt        (diary transcript)
//!     ├── figure.png        (last open figure, if any)
//!     └── error.txt         (only when the script raised)
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::{
    EngineConfig, EngineError, ExecutionReport, ExecutionResult, SimulationEngine,
    ENGINE_UNAVAILABLE, NO_ISSUES,
};

/// Raw output of one `-batch` invocation
struct BatchOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

/// Engine driving a local MATLAB installation
pub struct MatlabEngine {
    config: EngineConfig,
    executable: Option<PathBuf>,
    available: AtomicBool,
}

impl MatlabEngine {
    /// Start the engine
    ///
    /// Never fails: a missing executable or unwritable results root leaves
    /// the engine unavailable so code generation still works.
    pub fn start(config: EngineConfig) -> Self {
        if !config.startup {
            info!("Engine startup disabled; code will be generated but not executed");
            return Self::unavailable(config);
        }

        let Some(executable) = resolve_command(&config.command) else {
            warn!(command = %config.command, "Engine executable not found; code will be generated but not executed");
            return Self::unavailable(config);
        };

        if let Err(e) = std::fs::create_dir_all(&config.results_root) {
            warn!(dir = %config.results_root.display(), error = %e, "Cannot create results directory");
            return Self::unavailable(config);
        }

        info!(executable = %executable.display(), "MATLAB engine started");
        Self {
            config,
            executable: Some(executable),
            available: AtomicBool::new(true),
        }
    }

    /// Engine that reports itself unavailable for every call
    pub fn unavailable(config: EngineConfig) -> Self {
        Self {
            config,
            executable: None,
            available: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn executable(&self) -> Result<&Path, EngineError> {
        match &self.executable {
            Some(path) if self.is_available() => Ok(path),
            _ => Err(EngineError::Unavailable),
        }
    }

    async fn run_batch(&self, statements: &str) -> Result<BatchOutput, EngineError> {
        let executable = self.executable()?;
        let start = Instant::now();

        let mut cmd = Command::new(executable);
        cmd.arg("-batch")
            .arg(statements)
            .current_dir(&self.config.results_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.config.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), cmd.output())
                .await
                .map_err(|_| EngineError::Timeout(secs))??,
            None => cmd.output().await?,
        };

        debug!(
            exit_code = output.status.code().unwrap_or(-1),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Engine batch finished"
        );

        Ok(BatchOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }
}

#[async_trait]
impl SimulationEngine for MatlabEngine {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn validate(&self, code: &str) -> Result<Vec<String>, EngineError> {
        self.executable()?;
        if code.trim().is_empty() {
            return Err(EngineError::NoCode);
        }

        let script_path = self
            .config
            .results_root
            .join(format!("validate_script_{}.m", run_id()));
        tokio::fs::write(&script_path, code).await?;

        let statements = format!(
            "msgs = checkcode('{}'); for k = 1:numel(msgs), fprintf('[Line %d] %s\\n', msgs(k).line, msgs(k).message); end",
            matlab_path(&script_path)
        );
        let result = self.run_batch(&statements).await;
        remove_quietly(&script_path).await;

        let output = result?;
        if !output.success {
            return Err(EngineError::Command(failure_text(&output)));
        }

        let findings: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("[Line "))
            .map(str::to_string)
            .collect();

        if findings.is_empty() {
            Ok(vec![NO_ISSUES.to_string()])
        } else {
            Ok(findings)
        }
    }

    async fn execute(&self, code: &str) -> ExecutionReport {
        if self.executable().is_err() {
            return ExecutionReport::failed(ENGINE_UNAVAILABLE, ENGINE_UNAVAILABLE);
        }
        if code.trim().is_empty() {
            return ExecutionReport::failed("No code to execute.", "No code provided.");
        }

        let id = run_id();
        let script_name = format!("sim_script_{}", id);
        let root = &self.config.results_root;
        let script_path = root.join(format!("{}.m", script_name));
        let results_dir = root.join(format!("results_{}", id));

        let failed = |e: &dyn std::fmt::Display| ExecutionReport {
            message: format!("Error: {}", e),
            result: ExecutionResult {
                script_executed: Some(script_name.clone()),
                ..ExecutionResult::failure(e.to_string())
            },
        };

        if let Err(e) = tokio::fs::create_dir_all(&results_dir).await {
            return failed(&e);
        }
        if let Err(e) = tokio::fs::write(&script_path, clean_ascii(code)).await {
            return failed(&e);
        }

        let res = matlab_path(&results_dir);
        let statements = format!(
            "addpath('{root}'); try, diary('{res}/output.txt'); {script}; diary off; \
             if ~isempty(findall(0,'Type','Figure')), saveas(gcf, '{res}/figure.png'); end; \
             catch ME, diary off; fid = fopen('{res}/error.txt', 'w'); fprintf(fid, '%s', ME.message); fclose(fid); end; \
             rmpath('{root}');",
            root = matlab_path(root),
            res = res,
            script = script_name,
        );

        let run = self.run_batch(&statements).await;
        remove_quietly(&script_path).await;

        let output = match run {
            Ok(output) => output,
            Err(e) => return failed(&e),
        };

        let output_path = results_dir.join("output.txt");
        let figure_path = results_dir.join("figure.png");
        let raised = tokio::fs::read_to_string(results_dir.join("error.txt"))
            .await
            .ok()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let error = match raised {
            Some(message) => Some(message),
            None if !output.success => Some(failure_text(&output)),
            None => None,
        };

        let result = ExecutionResult {
            success: error.is_none(),
            script_executed: Some(script_name),
            output: output_path.exists().then_some(output_path),
            figure: figure_path.exists().then_some(figure_path),
            error,
        };

        let message = match &result.error {
            None => "Simulation executed successfully.".to_string(),
            Some(e) => format!("Execution failed: {}", e),
        };

        ExecutionReport { message, result }
    }

    async fn shutdown(&self) {
        if self.available.swap(false, Ordering::SeqCst) {
            info!("MATLAB engine shut down");
        } else {
            debug!("Engine already stopped");
        }
    }
}

/// Locate `command` directly or on `PATH`
fn resolve_command(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let full = dir.join(command);
        if full.is_file() {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", command));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Short random id usable inside a MATLAB identifier
fn run_id() -> String {
    let id = uuid::Uuid::now_v7().simple().to_string();
    id[id.len() - 8..].to_string()
}

/// Path as a MATLAB single-quoted string body
fn matlab_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/").replace('\'', "''")
}

fn failure_text(output: &BatchOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = output.stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    "engine exited with a failure status".to_string()
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Could not remove script");
    }
}

/// Fold typographic punctuation to ASCII and drop other non-ASCII characters
pub fn clean_ascii(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            c if c.is_ascii() => cleaned.push(c),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => cleaned.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => cleaned.push('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => cleaned.push('-'),
            '\u{00A0}' | '\u{2002}'..='\u{200A}' => cleaned.push(' '),
            '\u{2026}' => cleaned.push_str("..."),
            _ => {}
        }
    }
    cleaned
}
