//! Attempt and experiment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::heal::{StageOutcome, StageSet};
use crate::prompt::PromptVariant;
use crate::sandbox::ValidationScores;

/// Terminal status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Still running; never persisted.
    Pending,
    Success,
    Failure,
    /// A healing stage gave up on the artifact.
    Unrecoverable,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Pending => write!(f, "pending"),
            AttemptStatus::Success => write!(f, "success"),
            AttemptStatus::Failure => write!(f, "failure"),
            AttemptStatus::Unrecoverable => write!(f, "unrecoverable"),
        }
    }
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Machine-readable kind, e.g. `contract-violation`.
    pub kind: String,
    pub message: String,
}

/// The experiment arm an attempt belongs to: prompt variant plus enabled stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArmKey {
    pub variant: PromptVariant,
    pub stages: StageSet,
}

impl fmt::Display for ArmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.variant, self.stages)
    }
}

/// One full pipeline run for one skill under one arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    /// Unique within a run; recording is idempotent on it.
    pub id: String,
    pub ts: DateTime<Utc>,
    pub actor: String,
    pub skill_id: String,
    pub arm: String,
    pub key: ArmKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healed_text: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<StageOutcome>,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<ValidationScores>,
    /// Stages that changed the text; `None` unless healing produced an artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_count: Option<u32>,
    pub duration_ms: u64,
}

impl GenerationAttempt {
    pub fn new(id: impl Into<String>, skill_id: impl Into<String>, arm: impl Into<String>, key: ArmKey) -> Self {
        Self {
            id: id.into(),
            ts: Utc::now(),
            actor: actor_string(),
            skill_id: skill_id.into(),
            arm: arm.into(),
            key,
            raw_text: None,
            healed_text: None,
            outcomes: Vec::new(),
            status: AttemptStatus::Pending,
            failure: None,
            scores: None,
            repair_count: None,
            duration_ms: 0,
        }
    }

    pub fn fail(&mut self, kind: &str, message: impl ToString) {
        self.status = AttemptStatus::Failure;
        self.failure = Some(FailureReason {
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }

    pub fn mark_unrecoverable(&mut self, message: impl ToString) {
        self.status = AttemptStatus::Unrecoverable;
        self.failure = Some(FailureReason {
            kind: "unrecoverable".to_string(),
            message: message.to_string(),
        });
    }

    pub fn succeed(&mut self, scores: ValidationScores) {
        self.status = AttemptStatus::Success;
        self.failure = None;
        self.scores = Some(scores);
    }

    /// Stamp the duration. The attempt must have reached a terminal status.
    pub fn finish(mut self, elapsed: Duration) -> Self {
        if self.status == AttemptStatus::Pending {
            self.fail("incomplete", "attempt ended without a terminal status");
        }
        self.duration_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Success
    }
}

/// Aggregate counters for one arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub arm: String,
    pub key: ArmKey,
    pub attempts: u64,
    pub successes: u64,
    pub unrecoverable: u64,
    /// Attempts that produced a healed artifact.
    pub repair_samples: u64,
    pub repair_total: u64,
    pub total_duration_ms: u64,
    pub mean_repair_count: f64,
    pub mean_duration_ms: f64,
}

impl ExperimentRecord {
    pub fn new(arm: impl Into<String>, key: ArmKey) -> Self {
        Self {
            arm: arm.into(),
            key,
            attempts: 0,
            successes: 0,
            unrecoverable: 0,
            repair_samples: 0,
            repair_total: 0,
            total_duration_ms: 0,
            mean_repair_count: 0.0,
            mean_duration_ms: 0.0,
        }
    }

    /// Fold one finished attempt into the counters.
    pub fn apply(&mut self, attempt: &GenerationAttempt) {
        self.attempts += 1;
        match attempt.status {
            AttemptStatus::Success => self.successes += 1,
            AttemptStatus::Unrecoverable => self.unrecoverable += 1,
            AttemptStatus::Failure | AttemptStatus::Pending => {}
        }
        if let Some(repairs) = attempt.repair_count {
            self.repair_samples += 1;
            self.repair_total += u64::from(repairs);
        }
        self.total_duration_ms += attempt.duration_ms;

        self.mean_repair_count = if self.repair_samples == 0 {
            0.0
        } else {
            self.repair_total as f64 / self.repair_samples as f64
        };
        self.mean_duration_ms = self.total_duration_ms as f64 / self.attempts as f64;
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// Get the actor string for attempt metadata.
pub fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
