//! Implementation of the `codemend report` command.
//!
//! Reads a run directory and prints per-arm aggregates, a breakdown of
//! failure kinds, and optionally every failed attempt.

use std::collections::BTreeMap;
use std::path::Path;

use crate::cli::ReportArgs;
use crate::config::Config;
use crate::error::{MendError, Result};
use crate::metrics::{AttemptStatus, ExperimentRecord, GenerationAttempt, MetricsStore};

/// Execute the `codemend report` command.
pub fn cmd_report(args: ReportArgs, config: &Config) -> Result<()> {
    let store = match &args.run_dir {
        Some(dir) => MetricsStore::open(dir)?,
        None => MetricsStore::latest(Path::new(&config.experiment.output_dir))?,
    };
    let snapshot = store.load_snapshot()?;

    if args.json {
        let text = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| MendError::UserError(format!("failed to serialize snapshot: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    println!("Experiment {}", snapshot.run_id);
    println!(
        "Updated:    {}",
        snapshot.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    print_records(&snapshot.records);

    let attempts = store.load_attempts()?;
    let breakdown = failure_breakdown(&attempts);
    if !breakdown.is_empty() {
        println!();
        println!("Failures:");
        for ((arm, kind), count) in &breakdown {
            println!("  {:<40} {:<30} {:>5}", arm, kind, count);
        }
    }

    if args.failures {
        println!();
        for attempt in attempts.iter().filter(|a| !a.is_success()) {
            let reason = attempt
                .failure
                .as_ref()
                .map(|f| format!("{}: {}", f.kind, f.message))
                .unwrap_or_default();
            println!("  - {} [{}] {}", attempt.id, attempt.status, reason);
        }
    }

    Ok(())
}

/// Print the per-arm table.
pub fn print_records(records: &[ExperimentRecord]) {
    if records.is_empty() {
        println!("No attempts recorded.");
        return;
    }

    println!(
        "{:<40} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10}",
        "Arm", "Attempts", "Success", "Rate", "Unrecov", "Repairs", "Mean ms"
    );
    println!("{}", "-".repeat(96));
    for record in records {
        println!(
            "{:<40} {:>8} {:>8} {:>7.1}% {:>8} {:>8.2} {:>10.1}",
            record.arm,
            record.attempts,
            record.successes,
            record.success_rate() * 100.0,
            record.unrecoverable,
            record.mean_repair_count,
            record.mean_duration_ms
        );
    }
}

/// Count failed attempts per (arm, failure kind).
fn failure_breakdown(attempts: &[GenerationAttempt]) -> BTreeMap<(String, String), usize> {
    let mut counts = BTreeMap::new();
    for attempt in attempts {
        if attempt.status == AttemptStatus::Success {
            continue;
        }
        let kind = attempt
            .failure
            .as_ref()
            .map_or_else(|| attempt.status.to_string(), |f| f.kind.clone());
        *counts.entry((attempt.arm.clone(), kind)).or_insert(0) += 1;
    }
    counts
}
