//! Controller tests with in-process generation and execution fakes.

use super::*;
use crate::config::{ArmPreset, ArmSpec, ExperimentSettings, PipelineSettings};
use crate::generation::{GenerationError, GenerationService};
use crate::heal::HealedArtifact;
use crate::metrics::{AttemptStatus, MetricsRecorder, MetricsStore};
use crate::prompt::{GenerationRequest, PromptVariant};
use crate::sandbox::{ArtifactExecutor, SandboxFailure, ValidationScores};
use crate::skill::{InputKind, SkillSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

const FENCED_MODULE: &str = "```python\n\
def generate():\n    return {\"question\": \"What is 1 + 1?\", \"answer\": 2}\n\n\
def check(user_answer, item):\n    return {\"correct\": user_answer == str(item[\"answer\"])}\n\
```\n";

/// Serves a fixed response per skill id; unknown skills get `NotRecorded`.
struct FakeGenerator {
    responses: HashMap<String, String>,
}

impl FakeGenerator {
    fn new(responses: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            responses: responses
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }
}

#[async_trait]
impl GenerationService for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.responses
            .get(&request.skill_id)
            .cloned()
            .ok_or_else(|| GenerationError::NotRecorded(request.skill_id.clone()))
    }
}

/// Accepts any text that still defines `check` and is free of fences.
#[derive(Default)]
struct FakeExecutor {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl ArtifactExecutor for FakeExecutor {
    async fn execute(&self, artifact: HealedArtifact, _kind: InputKind) -> Result<ValidationScores, SandboxFailure> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let text = artifact.text();
        if text.contains("```") {
            Err(SandboxFailure::RuntimeFault("SyntaxError: invalid syntax".to_string()))
        } else if !text.contains("def check") {
            Err(SandboxFailure::ContractViolation("entry point `check` is missing".to_string()))
        } else {
            Ok(ValidationScores::new(Some(true), true))
        }
    }
}

fn skill(id: &str) -> SkillSpec {
    SkillSpec::new(id, "Single-digit addition")
        .with_template("def generate():\n    ...\n\ndef check(user_answer, item):\n    ...\n")
}

fn controller(generator: Arc<FakeGenerator>, executor: Arc<FakeExecutor>, workers: usize) -> AblationController {
    let runner = AttemptRunner::new(generator, executor, PipelineSettings::default());
    AblationController::new(runner, workers)
}

fn plan(repeats: u32) -> AblationPlan {
    AblationPlan::from_settings(&ExperimentSettings {
        repeats,
        ..ExperimentSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_every_dispatch_is_recorded_once() {
    let generator = FakeGenerator::new(&[("add", FENCED_MODULE), ("sum", FENCED_MODULE)]);
    let controller = controller(generator, Arc::new(FakeExecutor::default()), 3);
    let recorder = MetricsRecorder::spawn("run", None);
    let skills = vec![skill("add"), skill("sum")];
    let plan = plan(2);

    let summary = controller.run(&plan, &skills, &recorder.handle()).await.unwrap();
    recorder.shutdown().await.unwrap();

    assert!(summary.is_consistent());
    summary.check().unwrap();
    assert_eq!(summary.arms.len(), 3);
    for arm in &summary.arms {
        assert_eq!(arm.dispatched, 4);
        assert_eq!(arm.recorded, 4);
    }

    let no_repair = &summary.arms[0];
    let full_repair = &summary.arms[2];
    assert_eq!(no_repair.successes, 0);
    assert_eq!(full_repair.successes, 4);
    assert!(full_repair.mean_repair_count >= 1.0);
}

#[tokio::test]
async fn test_unrecoverable_artifact_counts_attempt_only() {
    let generator = FakeGenerator::new(&[("add", "x = 1\n")]);
    let controller = controller(generator, Arc::new(FakeExecutor::default()), 2);
    let recorder = MetricsRecorder::spawn("run", None);
    let plan = AblationPlan::from_settings(&ExperimentSettings {
        arms: vec![
            ArmSpec::preset(ArmPreset::PartialRepair, PromptVariant::Bare),
            ArmSpec::preset(ArmPreset::FullRepair, PromptVariant::Bare),
        ],
        ..ExperimentSettings::default()
    })
    .unwrap();

    let summary = controller.run(&plan, &[skill("add")], &recorder.handle()).await.unwrap();
    recorder.shutdown().await.unwrap();

    let partial = &summary.arms[0];
    assert_eq!(partial.recorded, 1);
    assert_eq!(partial.unrecoverable, 0);
    assert_eq!(partial.successes, 0);

    let full = &summary.arms[1];
    assert_eq!(full.recorded, 1);
    assert_eq!(full.unrecoverable, 1);
    assert_eq!(full.successes, 0);
    assert_eq!(full.mean_repair_count, 0.0);
}

#[tokio::test]
async fn test_failures_are_recorded_with_their_kind() {
    let temp = TempDir::new().unwrap();
    let store = MetricsStore::create(temp.path(), "run").unwrap();
    let recorder = MetricsRecorder::spawn("run", Some(store.clone()));

    let generator = FakeGenerator::new(&[("add", FENCED_MODULE)]);
    let controller = controller(generator, Arc::new(FakeExecutor::default()), 2);
    let plan = AblationPlan::from_settings(&ExperimentSettings {
        arms: vec![ArmSpec::preset(ArmPreset::FullRepair, PromptVariant::ContractAnnotated)],
        ..ExperimentSettings::default()
    })
    .unwrap();
    let incomplete = SkillSpec::new("blank", "Blank template");
    let skills = vec![skill("add"), skill("unrecorded"), incomplete];

    let summary = controller.run(&plan, &skills, &recorder.handle()).await.unwrap();
    recorder.shutdown().await.unwrap();
    assert_eq!(summary.arms[0].recorded, 3);

    let attempts: HashMap<String, _> = store
        .load_attempts()
        .unwrap()
        .into_iter()
        .map(|a| (a.skill_id.clone(), a))
        .collect();

    let ok = &attempts["add"];
    assert_eq!(ok.status, AttemptStatus::Success);
    assert!(ok.raw_text.as_deref().unwrap().starts_with("```"));
    assert!(!ok.healed_text.as_deref().unwrap().contains("```"));
    assert_eq!(ok.outcomes.len(), 7);

    let unrecorded = &attempts["unrecorded"];
    assert_eq!(unrecorded.status, AttemptStatus::Failure);
    assert_eq!(unrecorded.failure.as_ref().unwrap().kind, "generation-not-recorded");
    assert!(unrecorded.raw_text.is_none());

    let blank = &attempts["blank"];
    assert_eq!(blank.failure.as_ref().unwrap().kind, "skill-incomplete");
    assert!(blank.failure.as_ref().unwrap().message.contains("template skeleton"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_bounds_concurrency() {
    let ids: Vec<String> = (0..8).map(|i| format!("skill-{}", i)).collect();
    let responses: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), FENCED_MODULE)).collect();
    let executor = Arc::new(FakeExecutor {
        delay: Duration::from_millis(10),
        ..FakeExecutor::default()
    });
    let controller = controller(FakeGenerator::new(&responses), Arc::clone(&executor), 2);
    let recorder = MetricsRecorder::spawn("run", None);
    let skills: Vec<SkillSpec> = ids.iter().map(|id| skill(id)).collect();

    let summary = controller.run(&plan(1), &skills, &recorder.handle()).await.unwrap();
    recorder.shutdown().await.unwrap();

    summary.check().unwrap();
    assert!(executor.peak.load(Ordering::SeqCst) <= 2);
    assert!(executor.peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_missing_records_make_the_summary_incomplete() {
    let recorder = MetricsRecorder::spawn("run", None);
    let snapshot = recorder.handle().snapshot().await.unwrap();
    recorder.shutdown().await.unwrap();

    let plan = plan(1);
    let summary = AblationSummary::reconcile(&plan, &[2, 0, 0], &snapshot);
    assert!(!summary.is_consistent());

    let err = summary.check().unwrap_err();
    assert!(err.to_string().contains("recorded 0 of 2"));
}

#[tokio::test]
async fn test_named_arms_keep_their_attempts_apart() {
    let named = |name: &str, stages: &str| ArmSpec {
        name: Some(name.to_string()),
        stages: Some(stages.to_string()),
        variant: PromptVariant::Bare,
        ..ArmSpec::default()
    };
    let clashing = ExperimentSettings {
        arms: vec![named("x", "1"), named("x", "2")],
        ..ExperimentSettings::default()
    };
    assert!(AblationPlan::from_settings(&clashing).is_err());

    let plan = AblationPlan::from_settings(&ExperimentSettings {
        arms: vec![named("x", "1"), named("y", "2")],
        ..ExperimentSettings::default()
    })
    .unwrap();
    let generator = FakeGenerator::new(&[("add", FENCED_MODULE)]);
    let controller = controller(generator, Arc::new(FakeExecutor::default()), 2);
    let recorder = MetricsRecorder::spawn("run", None);

    let summary = controller.run(&plan, &[skill("add")], &recorder.handle()).await.unwrap();
    recorder.shutdown().await.unwrap();

    summary.check().unwrap();
    for arm in &summary.arms {
        assert_eq!(arm.recorded, 1);
    }
}
