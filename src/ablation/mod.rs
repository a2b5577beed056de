//! Ablation experiments.
//!
//! A plan expands configured arms into (prompt variant, stage set) pairs;
//! the controller runs every skill under every arm on a bounded worker pool
//! and reports each finished attempt to the metrics recorder.

mod controller;
mod plan;

#[cfg(test)]
mod tests;

pub use controller::{AblationController, AblationSummary, ArmSummary, AttemptRunner};
pub use plan::{AblationPlan, Arm, Dispatch, expand_arm};
