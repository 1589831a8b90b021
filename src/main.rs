//! Promover CLI
//!
//! Entry point for inspecting deployment slots from their stored records.
//!
//! # Usage
//!
//! ```bash
//! # Show the state of a slot
//! promover status score-predictor --log audit.jsonl
//!
//! # Full history of a model version
//! promover history 3f9c... --log audit.jsonl
//!
//! # Drift verdicts recorded for a slot
//! promover verdicts score-predictor --verdicts ./verdicts
//!
//! # Validate a deployment config
//! promover validate deploy.yaml
//! ```

use clap::Parser;
use promover::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
