//! Implementation of the `codemend run` command.
//!
//! Loads the skills, builds the ablation plan, and runs it with results
//! persisted under `<output_dir>/<run_id>/`.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::report::print_records;
use crate::ablation::{AblationController, AblationPlan, AttemptRunner};
use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::{MendError, Result};
use crate::fs::atomic_write_file;
use crate::generation::{
    GenerationService, HttpGenerationClient, ReplayClient, RetryingClient,
};
use crate::metrics::{ExperimentSnapshot, MetricsRecorder, MetricsStore, new_run_id};
use crate::sandbox::SandboxExecutor;
use crate::skill::{SkillSpec, load_skills};

/// Copy of the effective config written next to the results.
const RUN_CONFIG_FILE: &str = "config.yaml";

/// Execute the `codemend run` command.
pub async fn cmd_run(args: RunArgs, mut config: Config) -> Result<()> {
    if let Some(workers) = args.workers {
        config.experiment.workers = workers;
    }
    if let Some(repeats) = args.repeats {
        config.experiment.repeats = repeats;
    }
    if let Some(dir) = &args.output_dir {
        config.experiment.output_dir = dir.to_string_lossy().into_owned();
    }
    config.validate()?;

    let skills = select_skills(load_skills(&args.skills)?, &args.only)?;
    let plan = AblationPlan::from_settings(&config.experiment)?;

    let generator: Arc<dyn GenerationService> = match &args.replay {
        Some(dir) => Arc::new(ReplayClient::new(dir.clone())),
        None => {
            let client = HttpGenerationClient::from_settings(&config.generation)?;
            Arc::new(RetryingClient::from_settings(
                Box::new(client),
                &config.generation,
            ))
        }
    };
    let executor = Arc::new(SandboxExecutor::new(config.sandbox.clone())?);

    let (run_id, store) =
        MetricsStore::create_unique(Path::new(&config.experiment.output_dir), &new_run_id())?;
    store.write_snapshot(&ExperimentSnapshot::empty(&run_id))?;
    atomic_write_file(store.dir().join(RUN_CONFIG_FILE), &config.to_yaml()?)?;
    info!(run = %run_id, dir = %store.dir().display(), generator = generator.name(), "run started");

    let recorder = MetricsRecorder::spawn(&run_id, Some(store.clone()));
    let runner = AttemptRunner::new(generator, executor, config.pipeline.clone());
    let controller = AblationController::new(runner, config.experiment.workers);

    let outcome = controller.run(&plan, &skills, &recorder.handle()).await;
    let snapshot = recorder.shutdown().await?;
    let summary = outcome?;

    print_records(&snapshot.records);
    println!();
    println!("Run:     {}", run_id);
    println!("Results: {}", store.dir().display());

    summary.check()
}

/// Keep only the requested skill ids, in file order.
fn select_skills(skills: Vec<SkillSpec>, only: &[String]) -> Result<Vec<SkillSpec>> {
    if let Some(unknown) = only.iter().find(|id| !skills.iter().any(|s| &s.id == *id)) {
        return Err(MendError::UserError(format!(
            "skill '{}' is not defined in the skills file",
            unknown
        )));
    }

    let selected: Vec<SkillSpec> = skills
        .into_iter()
        .filter(|s| only.is_empty() || only.contains(&s.id))
        .collect();
    if selected.is_empty() {
        return Err(MendError::UserError(
            "no skills to run: the skills file is empty".to_string(),
        ));
    }
    Ok(selected)
}
