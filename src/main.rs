// ABOUTME: Entry point for the reimage CLI application.
// ABOUTME: Parses arguments, sets up logging, and maps errors to exit codes.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use reimage::output::{Output, OutputMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags when set
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut output = Output::new(mode);

    if let Err(e) = commands::upgrade(cli, &mut output).await {
        output.error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}
