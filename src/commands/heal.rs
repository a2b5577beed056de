//! Implementation of the `codemend heal` command.

use serde_json::json;

use super::{parse_stages, read_input};
use crate::cli::HealArgs;
use crate::config::Config;
use crate::error::{MendError, Result};
use crate::fs::atomic_write_file;
use crate::heal::{HealingPipeline, StageOutcome};

/// Execute the `codemend heal` command.
///
/// The healed text goes to stdout (or `--output`); stage outcomes go to
/// stderr so the text can be piped. An unrecoverable artifact exits with
/// the heal-failure code.
pub fn cmd_heal(args: HealArgs, config: &Config) -> Result<()> {
    let stages = parse_stages(&args.stages)?;
    let raw = read_input(args.input.as_deref())?;
    let report = HealingPipeline::new(&config.pipeline, stages).run(&raw);

    if args.json {
        let value = json!({
            "stages": stages.to_string(),
            "state": report.state,
            "repair_count": report.repair_count(),
            "outcomes": report.outcomes,
            "healed": report.result.as_ref().ok().map(|a| a.text()),
            "failure": report.result.as_ref().err().map(|f| f.to_string()),
        });
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| MendError::UserError(format!("failed to serialize report: {}", e)))?;
        println!("{}", text);
        report.result?;
        return Ok(());
    }

    for outcome in &report.outcomes {
        eprintln!("{}", describe(outcome));
    }

    let healed = report.result?;
    match &args.output {
        Some(path) => atomic_write_file(path, healed.text())?,
        None => print!("{}", healed.text()),
    }
    Ok(())
}

fn describe(outcome: &StageOutcome) -> String {
    let status = match (&outcome.failure, outcome.changed) {
        (Some(_), _) => "FAILED",
        (None, true) => "changed",
        (None, false) => "clean",
    };
    let mut line = format!("{:<2} {:<26} {:<8}", outcome.stage.index(), outcome.stage.as_str(), status);
    if let Some(failure) = &outcome.failure {
        line.push_str(failure);
    }
    if !outcome.notes.is_empty() {
        line.push_str(&outcome.notes.join("; "));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heal::StageName;

    #[test]
    fn test_describe_marks_changed_and_failed_stages() {
        let changed = StageOutcome::completed(
            StageName::FenceStripper,
            true,
            12,
            vec!["removed 2 fence lines".to_string()],
        );
        let line = describe(&changed);
        assert!(line.starts_with("1  fence-stripper"));
        assert!(line.contains("changed"));
        assert!(line.ends_with("removed 2 fence lines"));

        let failed = StageOutcome::failed(StageName::StructuralRepair, "line 3: unexpected indent", 40);
        assert!(describe(&failed).contains("FAILED  line 3: unexpected indent"));
    }
}
