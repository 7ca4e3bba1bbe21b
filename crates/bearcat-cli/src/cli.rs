//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Bearcat Budget - Track student expenses and get saving tips
#[derive(Parser)]
#[command(name = "bearcat")]
#[command(about = "Student expense tracker with AI saving tips", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to <config dir>/bearcat/config.toml if present)
    ///
    /// Environment variables override file values, e.g. FIREBASE_PROJECT_ID,
    /// OPENAI_API_KEY, LEDGER_BACKEND=memory, AI_BACKEND=mock.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run (interactive session if omitted)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive session: live expense list, add expenses, see tips
    Session,

    /// Add one expense and print a saving tip
    Add {
        /// Amount spent (e.g. 12.50)
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// What it was for
        #[arg(short, long, default_value = "")]
        note: String,
    },

    /// Print the current expenses
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration and backend health
    Status,
}
