//! Sandboxed validation of healed artifacts.
//!
//! This module provides:
//!
//! - **Precheck**: static import allow-list check, before anything is spawned
//! - **Session**: a scoped temp directory plus an isolated interpreter run
//! - **Report**: the harness report and the output-shape contract
//! - **Executor**: the [`ArtifactExecutor`] tying them together
//!
//! Timeouts, contract violations and runtime faults are distinct, terminal
//! outcomes; nothing here retries.

mod executor;
mod precheck;
mod report;
mod session;


pub use executor::{ArtifactExecutor, SandboxExecutor};
pub use precheck::{check_imports, imported_modules};
pub use report::{HarnessReport, ProbeKind, ProbeReport, evaluate, validate_item};
pub use session::{RunOutput, SandboxSession};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the sandbox rejected an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxFailure {
    /// Wall-clock or CPU budget exhausted.
    #[error("execution exceeded its {seconds}s budget")]
    ExecutionTimeout { seconds: u64 },

    /// An entry point is missing or returned the wrong shape.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Unhandled failure while loading or running the artifact.
    #[error("runtime fault: {0}")]
    RuntimeFault(String),

    /// The sandbox itself could not be prepared.
    #[error("sandbox setup failed: {0}")]
    Setup(String),
}

impl SandboxFailure {
    /// Short machine-readable kind used in attempt records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutionTimeout { .. } => "execution-timeout",
            Self::ContractViolation(_) => "contract-violation",
            Self::RuntimeFault(_) => "runtime-fault",
            Self::Setup(_) => "sandbox-setup",
        }
    }
}

/// How the `check` entry point graded the synthetic probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationScores {
    /// `None` when the item carries no literal answer (visual grading).
    pub accepts_correct: Option<bool>,
    pub rejects_incorrect: bool,
    /// Fraction of probes graded right, in `0.0..=1.0`.
    pub score: f64,
}

impl ValidationScores {
    pub fn new(accepts_correct: Option<bool>, rejects_incorrect: bool) -> Self {
        let graded = [accepts_correct, Some(rejects_incorrect)];
        let total = graded.iter().flatten().count();
        let right = graded.iter().flatten().filter(|ok| **ok).count();
        Self {
            accepts_correct,
            rejects_incorrect,
            score: right as f64 / total as f64,
        }
    }
}
