//! Implementation of the `codemend check` command.

use tracing::info;

use super::{parse_stages, read_input};
use crate::cli::CheckArgs;
use crate::config::Config;
use crate::error::{MendError, Result};
use crate::heal::{HealedArtifact, HealingPipeline};
use crate::sandbox::{ArtifactExecutor, SandboxExecutor};
use crate::skill::InputKind;

/// Execute the `codemend check` command.
///
/// Runs the artifact in the sandbox, optionally healing it first, and prints
/// the validation scores.
pub async fn cmd_check(args: CheckArgs, config: &Config) -> Result<()> {
    let kind = InputKind::from_str(&args.input_kind).ok_or_else(|| {
        MendError::UserError(format!(
            "unknown input kind '{}'. Expected free-text, structured-choice, or freehand-graph",
            args.input_kind
        ))
    })?;
    let text = read_input(Some(&args.input))?;

    let artifact = match &args.heal {
        Some(stages) => {
            let report = HealingPipeline::new(&config.pipeline, parse_stages(stages)?).run(&text);
            info!(repairs = report.repair_count(), "healed before execution");
            report.result?
        }
        None => HealedArtifact::new(text),
    };

    let executor = SandboxExecutor::new(config.sandbox.clone())?;
    let scores = executor.execute(artifact, kind).await?;

    println!("Contract:          satisfied");
    match scores.accepts_correct {
        Some(accepted) => println!("Accepts correct:   {}", accepted),
        None => println!("Accepts correct:   n/a (visual grading)"),
    }
    println!("Rejects incorrect: {}", scores.rejects_incorrect);
    println!("Score:             {:.2}", scores.score);
    Ok(())
}
