//! CLI module for promover
//!
//! Command handlers for inspecting deployment slots from their stored
//! records: audit history, drift verdicts, and configuration validation.

mod commands;

pub use commands::run_command;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// How much a command handler prints.
///
/// Summary lines cover the answer itself (slot state, verdict lines);
/// detail lines add per-record fields and replay counts.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Errors only
    Quiet,
    /// Summary lines
    Normal,
    /// Summary plus per-record detail
    Verbose,
}

impl LogLevel {
    /// Print a summary line unless output is suppressed.
    pub fn say(self, msg: &str) {
        if self != LogLevel::Quiet {
            println!("{msg}");
        }
    }

    /// Print a detail line; verbose runs only.
    pub fn detail(self, msg: &str) {
        if self == LogLevel::Verbose {
            println!("{msg}");
        }
    }

    /// Whether per-record detail should be rendered at all
    pub fn is_verbose(self) -> bool {
        self == LogLevel::Verbose
    }
}

/// Promover: model promotion control and drift monitoring
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "promover")]
#[command(version)]
#[command(about = "Promotion state machine, drift monitoring, and rollback for deployed models")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show the current state of a deployment slot
    Status(StatusArgs),

    /// Show the audit history of a model version
    History(HistoryArgs),

    /// List drift verdicts recorded for a slot
    Verdicts(VerdictsArgs),

    /// Validate a deployment configuration file
    Validate(ValidateArgs),
}

/// Arguments for the status command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct StatusArgs {
    /// Deployment slot to inspect
    #[arg(value_name = "SLOT")]
    pub slot: String,

    /// Path to the audit log file
    #[arg(short, long, default_value = "promover-audit.jsonl")]
    pub log: PathBuf,

    /// Directory holding drift verdict files
    #[arg(long)]
    pub verdicts: Option<PathBuf>,
}

/// Arguments for the history command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct HistoryArgs {
    /// Model version to inspect
    #[arg(value_name = "VERSION")]
    pub version: String,

    /// Path to the audit log file
    #[arg(short, long, default_value = "promover-audit.jsonl")]
    pub log: PathBuf,
}

/// Arguments for the verdicts command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct VerdictsArgs {
    /// Deployment slot to inspect
    #[arg(value_name = "SLOT")]
    pub slot: String,

    /// Directory holding drift verdict files
    #[arg(long, default_value = ".")]
    pub verdicts: PathBuf,

    /// Show only the most recent N verdicts
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}
