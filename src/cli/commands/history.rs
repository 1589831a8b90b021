//! History command implementation

use crate::audit::{AuditEvent, AuditLog, JsonFileLog};
use crate::cli::{HistoryArgs, LogLevel};

/// Format one audit event as a single line
pub fn format_event(event: &AuditEvent) -> String {
    let edge = match (event.from_stage, event.to_stage) {
        (Some(from), Some(to)) => format!(" {from} -> {to}"),
        _ => String::new(),
    };
    format!(
        "{} {:?}{edge} [{}] {}",
        event.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        event.kind,
        event.slot,
        event.reason
    )
}

pub fn run_history(args: HistoryArgs, level: LogLevel) -> Result<(), String> {
    let audit = JsonFileLog::new(&args.log);
    let events = audit
        .for_version(&args.version)
        .map_err(|e| format!("Failed to read audit log {}: {e}", args.log.display()))?;

    if events.is_empty() {
        level.say(&format!("No records for version '{}'", args.version));
        return Ok(());
    }

    level.say(&format!("History for {}:", args.version));
    for event in &events {
        level.say(&format!("  {}", format_event(event)));
        if level.is_verbose() {
            for (key, value) in &event.details {
                level.detail(&format!("    {key}: {value}"));
            }
        }
    }
    Ok(())
}
