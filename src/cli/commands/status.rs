//! Status command implementation

use crate::audit::{AuditLog, JsonFileLog, SlotView};
use crate::cli::{LogLevel, StatusArgs};
use crate::drift::{JsonFileVerdicts, VerdictStore};

/// Format a slot view as a human-readable block
pub fn format_status(view: &SlotView) -> String {
    let mut lines = vec![format!("Slot: {}", view.slot)];

    match &view.production {
        Some(version) => lines.push(format!("  Production: {version}")),
        None if view.unhealthy => {
            lines.push("  Production: NONE (slot unhealthy, operator intervention required)".to_string());
        }
        None => lines.push("  Production: none".to_string()),
    }

    if let Some(previous) = &view.previous_production {
        lines.push(format!("  Previous incumbent: {previous}"));
    }

    if !view.stages.is_empty() {
        lines.push("  Versions:".to_string());
        for (version, stage) in &view.stages {
            lines.push(format!("    {version}: {stage}"));
        }
    }

    lines.join("\n")
}

pub fn run_status(args: StatusArgs, level: LogLevel) -> Result<(), String> {
    let audit = JsonFileLog::new(&args.log);
    let events = audit
        .for_slot(&args.slot)
        .map_err(|e| format!("Failed to read audit log {}: {e}", args.log.display()))?;

    if events.is_empty() {
        level.say(&format!("No records for slot '{}'", args.slot));
        return Ok(());
    }

    let view = SlotView::replay(&args.slot, &events);
    level.say(&format_status(&view));

    if let Some(dir) = &args.verdicts {
        let store = JsonFileVerdicts::new(dir);
        let latest = store
            .latest(&args.slot)
            .map_err(|e| format!("Failed to read verdicts in {}: {e}", dir.display()))?;
        match latest {
            Some(verdict) => level.say(&format!(
                "  Latest drift verdict: {:?} ({} features flagged)",
                verdict.status,
                verdict.triggering_features.len()
            )),
            None => level.detail("  No drift verdicts recorded"),
        }
    }

    level.detail(&format!("  Events replayed: {}", events.len()));
    Ok(())
}
