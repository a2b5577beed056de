//! Runs every dispatch of a plan and reconciles the recorded counts.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::plan::{AblationPlan, Arm};
use crate::config::PipelineSettings;
use crate::error::{MendError, Result};
use crate::generation::GenerationService;
use crate::heal::{HealReport, HealingPipeline};
use crate::metrics::{ArmKey, ExperimentSnapshot, GenerationAttempt, MetricsHandle};
use crate::prompt::compose;
use crate::sandbox::ArtifactExecutor;
use crate::skill::SkillSpec;

/// Drives one attempt through compose, generate, heal and execute.
pub struct AttemptRunner {
    generator: Arc<dyn GenerationService>,
    executor: Arc<dyn ArtifactExecutor>,
    pipeline: PipelineSettings,
}

impl AttemptRunner {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        executor: Arc<dyn ArtifactExecutor>,
        pipeline: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            executor,
            pipeline,
        }
    }

    /// Run one attempt. Every outcome, including failures, comes back as a
    /// finished `GenerationAttempt`.
    pub async fn run(&self, id: String, skill: &SkillSpec, arm: &Arm) -> GenerationAttempt {
        let started = Instant::now();
        let mut attempt = GenerationAttempt::new(id, &skill.id, &arm.name, arm.key);
        self.drive(&mut attempt, skill, arm).await;
        let attempt = attempt.finish(started.elapsed());
        debug!(
            attempt = %attempt.id,
            status = %attempt.status,
            duration_ms = attempt.duration_ms,
            "attempt finished"
        );
        attempt
    }

    async fn drive(&self, attempt: &mut GenerationAttempt, skill: &SkillSpec, arm: &Arm) {
        let request = match compose(skill, arm.key.variant) {
            Ok(request) => request,
            Err(e) => return attempt.fail("skill-incomplete", e),
        };

        let raw = match self.generator.generate(&request).await {
            Ok(raw) => raw,
            Err(e) => return attempt.fail(e.kind(), e),
        };

        let report = HealingPipeline::new(&self.pipeline, arm.key.stages).run(&raw);
        attempt.raw_text = Some(raw);
        let repair_count = report.repair_count();
        let HealReport {
            outcomes, result, ..
        } = report;
        attempt.outcomes = outcomes;

        let artifact = match result {
            Ok(artifact) => artifact,
            Err(failure) => return attempt.mark_unrecoverable(failure),
        };
        attempt.repair_count = Some(repair_count);
        attempt.healed_text = Some(artifact.text().to_string());

        match self.executor.execute(artifact, skill.input_kind).await {
            Ok(scores) => attempt.succeed(scores),
            Err(e) => attempt.fail(e.kind(), e),
        }
    }
}

/// Per-arm line of the experiment summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmSummary {
    pub name: String,
    pub key: ArmKey,
    pub dispatched: u64,
    pub recorded: u64,
    pub successes: u64,
    pub unrecoverable: u64,
    pub success_rate: f64,
    pub mean_repair_count: f64,
    pub mean_duration_ms: f64,
}

impl ArmSummary {
    pub fn is_consistent(&self) -> bool {
        self.dispatched == self.recorded
    }
}

/// Outcome of a whole experiment run.
#[derive(Debug, Clone, Serialize)]
pub struct AblationSummary {
    pub run_id: String,
    pub arms: Vec<ArmSummary>,
}

impl AblationSummary {
    /// Join the dispatched counts with the recorded snapshot.
    pub fn reconcile(plan: &AblationPlan, dispatched: &[u64], snapshot: &ExperimentSnapshot) -> Self {
        let arms = plan
            .arms()
            .iter()
            .zip(dispatched)
            .map(|(arm, &dispatched)| {
                let record = snapshot.records.iter().find(|r| r.key == arm.key);
                ArmSummary {
                    name: arm.name.clone(),
                    key: arm.key,
                    dispatched,
                    recorded: record.map_or(0, |r| r.attempts),
                    successes: record.map_or(0, |r| r.successes),
                    unrecoverable: record.map_or(0, |r| r.unrecoverable),
                    success_rate: record.map_or(0.0, |r| r.success_rate()),
                    mean_repair_count: record.map_or(0.0, |r| r.mean_repair_count),
                    mean_duration_ms: record.map_or(0.0, |r| r.mean_duration_ms),
                }
            })
            .collect();
        Self {
            run_id: snapshot.run_id.clone(),
            arms,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.arms.iter().all(ArmSummary::is_consistent)
    }

    /// Error describing every arm whose counts disagree.
    pub fn check(&self) -> Result<()> {
        let mismatched: Vec<String> = self
            .arms
            .iter()
            .filter(|arm| !arm.is_consistent())
            .map(|arm| format!("arm '{}' recorded {} of {}", arm.name, arm.recorded, arm.dispatched))
            .collect();
        if mismatched.is_empty() {
            Ok(())
        } else {
            Err(MendError::Incomplete(mismatched.join("; ")))
        }
    }
}

/// Fans the plan out over a bounded pool of attempt tasks.
pub struct AblationController {
    runner: Arc<AttemptRunner>,
    workers: usize,
}

impl AblationController {
    pub fn new(runner: AttemptRunner, workers: usize) -> Self {
        Self {
            runner: Arc::new(runner),
            workers: workers.max(1),
        }
    }

    /// Dispatch every (skill, arm, repeat) of `plan` and wait for all of them.
    ///
    /// At most `workers` attempts are in flight. Attempts that panic or that
    /// the recorder rejects are logged and show up as a dispatched/recorded
    /// mismatch in the summary.
    pub async fn run(
        &self,
        plan: &AblationPlan,
        skills: &[SkillSpec],
        metrics: &MetricsHandle,
    ) -> Result<AblationSummary> {
        let skills_shared = Arc::new(skills.to_vec());
        let arms = Arc::new(plan.arms().to_vec());
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut dispatched = vec![0u64; arms.len()];
        let mut join_set = JoinSet::new();

        info!(
            arms = arms.len(),
            skills = skills.len(),
            repeats = plan.repeats(),
            workers = self.workers,
            "starting experiment"
        );

        for dispatch in plan.dispatches(skills.len()) {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| MendError::UserError(format!("worker pool closed: {}", e)))?;
            let id = plan.attempt_id(dispatch, skills);
            let runner = Arc::clone(&self.runner);
            let skills = Arc::clone(&skills_shared);
            let arms = Arc::clone(&arms);
            let metrics = metrics.clone();
            dispatched[dispatch.arm] += 1;

            join_set.spawn(async move {
                let _permit = permit;
                let attempt = runner
                    .run(id, &skills[dispatch.skill], &arms[dispatch.arm])
                    .await;
                let id = attempt.id.clone();
                (id, metrics.record(attempt).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((id, Ok(true))) => debug!(attempt = %id, "attempt recorded"),
                Ok((id, Ok(false))) => warn!(attempt = %id, "attempt recorded twice"),
                Ok((id, Err(e))) => error!(attempt = %id, error = %e, "attempt not recorded"),
                Err(e) => error!(error = %e, "attempt task failed"),
            }
        }

        let snapshot = metrics.snapshot().await?;
        let summary = AblationSummary::reconcile(plan, &dispatched, &snapshot);
        for arm in &summary.arms {
            info!(
                arm = %arm.name,
                attempts = arm.recorded,
                successes = arm.successes,
                unrecoverable = arm.unrecoverable,
                mean_repair_count = arm.mean_repair_count,
                "arm complete"
            );
        }
        Ok(summary)
    }
}
