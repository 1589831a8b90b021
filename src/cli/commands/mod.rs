//! CLI command implementations

mod history;
mod status;
mod validate;
mod verdicts;


use crate::cli::{Cli, Command, LogLevel};

/// Execute a CLI command based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<(), String> {
    // Configure output based on verbose/quiet flags
    let log_level = if cli.quiet {
        LogLevel::Quiet
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Normal
    };

    match cli.command {
        Command::Status(args) => status::run_status(args, log_level),
        Command::History(args) => history::run_history(args, log_level),
        Command::Verdicts(args) => verdicts::run_verdicts(args, log_level),
        Command::Validate(args) => validate::run_validate(args, log_level),
    }
}
