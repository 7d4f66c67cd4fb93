//! Error types for the CLI

use core_types::RuntimeError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// The program raised an error that nothing caught
    #[error("{}", .0.traceback())]
    Runtime(#[from] RuntimeError),

    /// File I/O error
    #[error("could not read '{path}': {source}")]
    Io {
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A bytecode or configuration document did not parse
    #[error("invalid {what} '{path}': {source}")]
    Format {
        /// Kind of document
        what: &'static str,
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Report serialization failed
    #[error("could not serialize report: {0}")]
    Report(#[source] serde_json::Error),

    /// Neither a file nor a demo was given
    #[error("nothing to run: pass --file <FILE> or --demo <NAME>")]
    NoProgram,
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
