//! Command-line arguments

use std::path::PathBuf;

use bytecode_system::BytecodeChunk;
use clap::{Parser, ValueEnum};
use interpreter::VmConfig;

use crate::demos::Demo;
use crate::error::{CliError, CliResult};

/// How the result of a run is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    /// The repr of the result, when it is not `None`
    #[default]
    Text,
    /// A JSON document with result, output and JIT events
    Json,
}

/// Basalt bytecode runtime
#[derive(Debug, Parser)]
#[command(name = "basalt", version, about = "Run register bytecode with hot-loop compilation")]
pub struct Cli {
    /// Bytecode file (JSON) to run
    #[arg(short, long, value_name = "FILE", conflicts_with = "demo")]
    pub file: Option<PathBuf>,

    /// Run a built-in demo program
    #[arg(short, long, value_enum)]
    pub demo: Option<Demo>,

    /// Print the disassembly instead of running
    #[arg(long)]
    pub disasm: bool,

    /// Keep every loop interpreted
    #[arg(long)]
    pub no_jit: bool,

    /// Backward branches before a loop is compiled
    #[arg(long, value_name = "COUNT")]
    pub jit_threshold: Option<u32>,

    /// Maximum number of active frames
    #[arg(long, value_name = "DEPTH")]
    pub max_call_depth: Option<usize>,

    /// Echo JIT events to stderr
    #[arg(long)]
    pub trace_jit: bool,

    /// VM configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format of the run report
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Effective VM configuration
    ///
    /// Layers, lowest priority first: defaults, `--config`, `BASALT_*`
    /// environment variables, command-line flags.
    pub fn vm_config(&self) -> CliResult<VmConfig> {
        self.vm_config_with(|name| std::env::var(name).ok())
    }

    /// [`Cli::vm_config`] with an explicit environment
    pub fn vm_config_with(&self, env: impl Fn(&str) -> Option<String>) -> CliResult<VmConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = read(path)?;
                VmConfig::from_json(&text).map_err(|source| CliError::Format {
                    what: "configuration",
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => VmConfig::default(),
        }
        .with_overrides(env);

        if self.no_jit {
            config = config.with_jit(false);
        }
        if let Some(threshold) = self.jit_threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(depth) = self.max_call_depth {
            config = config.with_max_call_depth(depth);
        }
        if self.trace_jit {
            config = config.with_trace_jit(true);
        }
        if self.report == ReportFormat::Json {
            config = config.with_capture_output(true);
        }
        Ok(config)
    }

    /// The program selected by `--file` or `--demo`
    pub fn program(&self) -> CliResult<BytecodeChunk> {
        match (&self.file, self.demo) {
            (Some(path), _) => load_chunk(path),
            (None, Some(demo)) => Ok(demo.chunk()),
            (None, None) => Err(CliError::NoProgram),
        }
    }
}

fn read(path: &PathBuf) -> CliResult<String> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Read a bytecode chunk serialized as JSON
pub fn load_chunk(path: &PathBuf) -> CliResult<BytecodeChunk> {
    let text = read(path)?;
    BytecodeChunk::from_json(&text).map_err(|source| CliError::Format {
        what: "bytecode",
        path: path.display().to_string(),
        source,
    })
}
