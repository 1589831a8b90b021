//! Verdicts command implementation

use crate::cli::{LogLevel, VerdictsArgs};
use crate::drift::{DriftVerdict, JsonFileVerdicts, VerdictStore};

/// Format one verdict as a single line
pub fn format_verdict(verdict: &DriftVerdict) -> String {
    let flagged = if verdict.triggering_features.is_empty() {
        String::new()
    } else {
        format!(" [{}]", verdict.triggering_features.join(", "))
    };
    format!(
        "{} .. {} {:?} version={}{flagged}",
        verdict.window_start.format("%Y-%m-%d %H:%M"),
        verdict.window_end.format("%Y-%m-%d %H:%M"),
        verdict.status,
        verdict.model_version_id
    )
}

pub fn run_verdicts(args: VerdictsArgs, level: LogLevel) -> Result<(), String> {
    let store = JsonFileVerdicts::new(&args.verdicts);
    let mut verdicts = store
        .for_slot(&args.slot)
        .map_err(|e| format!("Failed to read verdicts in {}: {e}", args.verdicts.display()))?;

    if let Some(limit) = args.limit {
        let skip = verdicts.len().saturating_sub(limit);
        verdicts.drain(..skip);
    }

    if verdicts.is_empty() {
        level.say(&format!("No verdicts for slot '{}'", args.slot));
        return Ok(());
    }

    for verdict in &verdicts {
        level.say(&format_verdict(verdict));
        if level.is_verbose() {
            for (feature, score) in &verdict.scores {
                level.detail(&format!("    {feature}: {score:.4}"));
            }
        }
    }
    Ok(())
}
