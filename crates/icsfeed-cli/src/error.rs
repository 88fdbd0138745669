//! Error types for the icsfeed CLI.

use icsfeed_core::TracingError;
use icsfeed_source::SourceError;
use thiserror::Error;

/// Errors surfaced to the user by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file could not be read or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The command line did not describe a usable feed or range.
    #[error("{0}")]
    Usage(String),

    /// The feed could not be fetched or parsed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Writing output failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialising JSON output failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The log subscriber could not be installed.
    #[error(transparent)]
    Tracing(#[from] TracingError),
}

impl CliError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
