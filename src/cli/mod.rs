//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::etl::SyncMode;

pub mod commands;

/// Worklog ETL - sync timesheet rows between two Bitable tables
#[derive(Parser, Debug)]
#[command(name = "wetl", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ./config.json, then ~/.worklog-etl/config.json)
    #[arg(short, long, global = true, env = "WETL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sync (extract, transform, dedup, load)
    Run(RunArgs),

    /// Load and validate the config, then print it with secrets hidden
    CheckConfig,

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Flags of `wetl run`. Each one overrides the config file.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Sync mode
    #[arg(short, long, value_enum)]
    pub mode: Option<SyncMode>,

    /// Window length in days for incremental mode
    #[arg(long)]
    pub days: Option<u32>,

    /// Prepare everything but write nothing
    #[arg(short, long)]
    pub dry_run: bool,

    /// Send the result notification
    #[arg(short, long)]
    pub send: bool,

    /// Also export transformed rows to this CSV file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
