//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Desktop activity tracker.
///
/// Samples the foreground window at a fixed interval, groups the samples into
/// categorized sessions, and reports where the day went.
#[derive(Debug, Parser)]
#[command(name = "atrack", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Track the foreground window until interrupted.
    Track,

    /// Show the report for one day.
    Report {
        /// Day to report on, as YYYY-MM-DD (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,

        /// Also write the text report next to the database.
        #[arg(long)]
        save: bool,
    },

    /// Summarize every recorded day.
    Summary {
        /// Output as JSON.
        #[arg(long)]
        json: bool,

        /// Also write the text summary next to the database.
        #[arg(long)]
        save: bool,
    },

    /// Show database location and the last recorded session.
    Status,

    /// Write the default config file.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Show the config file location and effective settings.
    Config,
}
