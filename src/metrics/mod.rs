//! Metrics capture for generation attempts.
//!
//! - **Record**: `GenerationAttempt`, `ExperimentRecord` and the arm key
//! - **Store**: the append-only run directory
//! - **Recorder**: the aggregation actor every worker reports to

mod record;
mod recorder;
mod store;

#[cfg(test)]
mod tests;

pub use record::{
    ArmKey, AttemptStatus, ExperimentRecord, FailureReason, GenerationAttempt, actor_string,
};
pub use recorder::{MetricsError, MetricsHandle, MetricsRecorder};
pub use store::{ATTEMPTS_FILE, EXPERIMENTS_FILE, ExperimentSnapshot, MetricsStore, new_run_id};
