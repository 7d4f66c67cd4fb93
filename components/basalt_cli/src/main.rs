//! Basalt runtime CLI
//!
//! Entry point for the runtime. Parses CLI arguments, installs the log
//! subscriber and delegates to the Runtime for execution.

use std::process::ExitCode;

use basalt_cli::{Cli, CliError, CliResult, ReportFormat, Runtime};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> CliResult<()> {
    let chunk = cli.program()?;
    if cli.disasm {
        print!("{}", chunk);
        return Ok(());
    }

    let mut runtime = Runtime::new(cli.vm_config()?);
    let report = runtime.run(chunk)?;
    match cli.report {
        ReportFormat::Text => {
            if !report.returned_none() {
                println!("{}", report.result);
            }
        }
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&report).map_err(CliError::Report)?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ CliError::Runtime(_)) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(2)
        }
    }
}
