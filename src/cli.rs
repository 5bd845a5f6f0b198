// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! The binary administers promotion processes stored under a data root. It
//! does not run promotions itself; that is the embedding host's job.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `promoted`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "promoted",
    version,
    about = "Inspect and configure build promotion processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Data root holding per-job promotion state.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROMOTED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List the promotion processes of a job.
    Processes {
        #[arg(long)]
        job: String,
        /// Include archived processes.
        #[arg(long)]
        all: bool,
    },
    /// Create an empty process, or reactivate an archived one.
    Add {
        #[arg(long)]
        job: String,
        name: String,
    },
    /// Archive a process. Its history is kept.
    Archive {
        #[arg(long)]
        job: String,
        name: String,
    },
    Rename {
        #[arg(long)]
        job: String,
        old: String,
        new: String,
    },
    /// Print one process definition as TOML.
    Show {
        #[arg(long)]
        job: String,
        name: String,
    },
    /// Print every active definition of a job as one TOML document.
    Export {
        #[arg(long)]
        job: String,
    },
    /// Replace a job's active processes with the ones in a TOML document.
    Apply {
        #[arg(long)]
        job: String,
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Show the promotion runs of a process, newest first.
    History {
        #[arg(long)]
        job: String,
        name: String,
    },
    /// Show the promotion statuses recorded on a build.
    Statuses {
        #[arg(long)]
        job: String,
        #[arg(long)]
        build: u64,
    },
    /// List the built-in condition kinds.
    Conditions,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
