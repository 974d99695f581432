//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use tilechunk::config::ConfigFileError;
use tilechunk::ChunkError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Missing or invalid command-line argument
    Usage(String),
    /// Failed to start the async runtime or worker pool
    Runtime(String),
    /// The job could not report its status
    Job(ChunkError),
    /// The job ran and failed
    JobFailed(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Job(ChunkError::Notification(_)) => {
                eprintln!();
                eprintln!("Check that the status queue URL is correct and that");
                eprintln!("AWS credentials for its region are available.");
            }
            CliError::Usage(_) => {
                eprintln!();
                eprintln!("Run with --help for usage.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Runtime(msg) => write!(f, "Failed to start: {}", msg),
            CliError::Job(e) => write!(f, "Job error: {}", e),
            CliError::JobFailed(msg) => write!(f, "Job failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Job(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChunkError> for CliError {
    fn from(e: ChunkError) -> Self {
        CliError::Job(e)
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}
