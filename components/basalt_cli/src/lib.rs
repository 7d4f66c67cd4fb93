//! Basalt runtime CLI library
//!
//! Provides the Runtime struct, argument parsing and the built-in demo
//! programs for the `basalt` binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod demos;
pub mod error;
pub mod runtime;

pub use cli::{Cli, ReportFormat};
pub use demos::Demo;
pub use error::{CliError, CliResult};
pub use runtime::{RunReport, Runtime};
