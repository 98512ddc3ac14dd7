use crate::config::ConfigError;
use crate::run::RunError;
use colored::Colorize;
use std::fmt;
use std::process;

/// Exit codes for the CLI.
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Unified error type for CLI operations.
pub enum CliError {
    /// The run configuration was rejected before any fetch.
    Config(ConfigError),
    /// A link run failed after validation.
    Run(RunError),
    /// The HTTP front-end could not start or stopped with an error.
    Server(String),
    /// Bad file path, unreadable input.
    Input(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(
                f,
                "{} {e}\n  {} fix the configuration file and run again",
                "error:".red().bold(),
                "help:".cyan().bold(),
            ),
            CliError::Run(RunError::Fetch { source, .. }) if source.is_transient() => write!(
                f,
                "{} {}\n  {} rows fetched so far are cached; set retry.max_retries to retry transient failures",
                "error:".red().bold(),
                self.message(),
                "help:".cyan().bold(),
            ),
            CliError::Run(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Server(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::Input(msg) => write!(f, "{} {msg}", "error:".red().bold()),
        }
    }
}

impl CliError {
    fn message(&self) -> String {
        match self {
            CliError::Config(e) => e.to_string(),
            CliError::Run(e) => e.to_string(),
            CliError::Server(msg) | CliError::Input(msg) => msg.clone(),
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<RunError> for CliError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Config(e) => CliError::Config(e),
            other => CliError::Run(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Input(e.to_string())
    }
}

/// Print error and exit with the appropriate code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    let code = match &err {
        CliError::Config(_) => EXIT_CONFIG,
        _ => EXIT_ERROR,
    };
    process::exit(code)
}

pub type CliResult<T> = std::result::Result<T, CliError>;
