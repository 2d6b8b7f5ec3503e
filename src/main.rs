//! castpair - cast receiver for encrypted photo collections
//!
//! Pairs with a sender over a JSON-lines session transport on stdin/stdout,
//! then shows the paired collection as a paced, endless slideshow.
//!
//! # Usage
//!
//! ```bash
//! # Full lifecycle (the default)
//! castpair
//!
//! # Slideshow with known credentials
//! castpair slideshow -k <base64-key> -t <cast-token> --limit 10
//!
//! # Verbose logs
//! RUST_LOG=castpair=debug castpair run
//! ```

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ExitCode, Output};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}

/// Logs go to stderr; stdout carries session transport frames
fn init_logging(quiet: bool) {
    let default = if quiet { "castpair=warn" } else { "castpair=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let config = cli.config.as_ref();
    let api_url = cli.api_url.as_deref();

    match cli.subcommand() {
        Command::Run(cmd) => commands::run_cmd(cmd, config, api_url, &output).await,
        Command::Slideshow(cmd) => commands::slideshow_cmd(cmd, config, api_url, &output).await,
        Command::Config(cmd) => commands::config_cmd(cmd, config, &output).await,
    }
}
