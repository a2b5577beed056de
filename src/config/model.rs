//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for a codemend run.
///
/// This struct represents the contents of `codemend.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Generation service
    // =========================================================================
    /// Endpoint, model, and retry policy for the text-generation service.
    pub generation: GenerationSettings,

    // =========================================================================
    // Healing pipeline
    // =========================================================================
    /// Bounds for the healing stages.
    pub pipeline: PipelineSettings,

    // =========================================================================
    // Sandbox
    // =========================================================================
    /// Interpreter, resource ceilings, and allow-lists for isolated execution.
    pub sandbox: SandboxSettings,

    // =========================================================================
    // Ablation experiment
    // =========================================================================
    /// Worker count, repeats, output location, and the arms to compare.
    pub experiment: ExperimentSettings,
}
