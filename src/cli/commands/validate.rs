//! Validate command implementation

use crate::cli::{LogLevel, ValidateArgs};
use crate::config::DeployConfig;

/// Format a configuration summary as a string
pub fn format_summary(config: &DeployConfig) -> String {
    let mut lines = Vec::new();

    if config.slots.is_empty() {
        lines.push("  Slots: any".to_string());
    } else {
        lines.push(format!("  Slots: {}", config.slots.join(", ")));
    }

    lines.push(format!("  Staging gate: {} metric(s)", config.staging_gate.bounds.len()));
    for (metric, bound) in &config.staging_gate.bounds {
        lines.push(format!("    {metric}: {bound}"));
    }

    lines.push(format!("  Production gate: {} metric(s)", config.production_gate.bounds.len()));
    for (metric, bound) in &config.production_gate.bounds {
        lines.push(format!("    {metric}: {bound}"));
    }

    lines.push(format!("  Automated promotion: {}", config.automated_promotion));
    lines.push(format!("  Rollback debounce: {} consecutive critical verdicts", config.debounce_n));
    lines.push(format!(
        "  Drift monitor: min_samples={}, numeric warn/crit {}/{}",
        config.monitor.min_samples,
        config.monitor.numeric_thresholds.warning,
        config.monitor.numeric_thresholds.critical
    ));

    lines.join("\n")
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    let config = DeployConfig::from_file(&args.config)
        .map_err(|e| format!("Invalid config {}: {e}", args.config.display()))?;

    level.say(&format!("{} is valid", args.config.display()));
    if level.is_verbose() {
        level.detail(&format_summary(&config));
    }
    Ok(())
}
