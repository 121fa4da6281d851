use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{
    analyse::{self, AnalyseArgs},
    failures::{self, FailuresArgs},
    run::{self, RunArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "uqc", about = "UQ campaign runner and result analyser")]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. `info`, `uq_campaign=debug`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a campaign described by a YAML configuration.
    Run(RunArgs),
    /// Analyse a persisted collation table.
    Analyse(AnalyseArgs),
    /// List the failed runs of a persisted table with their reasons.
    Failures(FailuresArgs),
}

fn init_tracing(level: &str) -> Result<(), Box<dyn Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Analyse(args) => analyse::run(&args),
        Command::Failures(args) => failures::run(&args),
    }
}
