//! Session-level settings
//!
//! Each session carries its own [`SessionConfig`] instead of sharing a
//! process-wide logger, so two sessions in the same process can run with
//! different verbosity.

/// How much the controller narrates to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Warnings and failures only
    Quiet,
    /// Progress and results
    Normal,
    /// Adds per-step detail
    Verbose,
    /// Everything, including collaborator payload sizes
    Debug,
}

impl Verbosity {
    /// `tracing` level name matching this verbosity
    pub fn level(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal | Verbosity::Verbose => "info",
            Verbosity::Debug => "debug",
        }
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> String {
        let level = self.level();
        format!("{level},simforge={level}")
    }
}

/// Options recognized for a single authoring session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of `-v` flags given
    pub verbose: u8,
    /// Suppress everything except warnings and errors
    pub quiet: bool,
    /// Start the execution engine when the session opens
    pub engine_startup: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            quiet: false,
            engine_startup: true,
        }
    }
}

impl SessionConfig {
    /// Resolve the flags into a single verbosity; `quiet` wins over `verbose`
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Debug,
            }
        }
    }
}
