//! Bearcat CLI - Student expense tracker
//!
//! Usage:
//!   bearcat                       Interactive session (default)
//!   bearcat add 12.50 -n coffee   Add one expense and print a tip
//!   bearcat list --json           Print current expenses
//!   bearcat status                Show configuration and backend health

mod cli;
mod commands;


use anyhow::{Context, Result};
use bearcat_core::config::Config;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr; stdout is the rendered screen
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Session) {
        Commands::Session => commands::cmd_session(&config).await,
        Commands::Add { amount, note } => commands::cmd_add(&config, &amount, &note).await,
        Commands::List { json } => commands::cmd_list(&config, json).await,
        Commands::Status => commands::cmd_status(&config).await,
    }
}
