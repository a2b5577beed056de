//! Configuration sections, presets, and defaults for codemend.

use crate::prompt::PromptVariant;
use serde::{Deserialize, Serialize};

/// Settings for the text-generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub endpoint: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Environment variable holding the bearer key (unset means no auth header).
    pub api_key_env: String,

    /// Per-request timeout.
    pub request_timeout_seconds: u64,

    /// Retries for transient failures (timeout, quota), on top of the first try.
    pub max_retries: u32,

    /// First backoff delay; doubles on every retry.
    pub backoff_base_ms: u64,

    /// Sampling temperature.
    pub temperature: f64,

    /// Completion token limit.
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_seconds: 60,
            max_retries: 2,
            backoff_base_ms: 500,
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

/// Settings for the healing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Pass ceiling for the pattern rewriter.
    pub pattern_max_passes: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pattern_max_passes: 8,
        }
    }
}

/// Settings for the sandbox executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Interpreter command (shell-words parsed; no shell).
    pub interpreter: String,

    /// Wall-clock budget for one execution.
    pub timeout_seconds: u64,

    /// Address-space ceiling applied inside the child.
    pub memory_limit_mb: u64,

    /// CPU-time ceiling applied inside the child.
    pub cpu_limit_seconds: u64,

    /// Glob patterns of modules the artifact may import.
    pub allowed_imports: Vec<String>,

    /// Paths the artifact may open read-only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_paths: Vec<String>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3 -I".to_string(),
            timeout_seconds: 10,
            memory_limit_mb: 512,
            cpu_limit_seconds: 5,
            allowed_imports: default_allowed_imports(),
            allowed_paths: Vec::new(),
        }
    }
}

/// Settings for the ablation experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSettings {
    /// Concurrent attempts in flight.
    pub workers: usize,

    /// Attempts per skill per arm.
    pub repeats: u32,

    /// Directory receiving `attempts.ndjson` and `experiments.json`.
    pub output_dir: String,

    /// Arms to compare.
    pub arms: Vec<ArmSpec>,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            repeats: 1,
            output_dir: ".codemend".to_string(),
            arms: default_arms(),
        }
    }
}

/// Named stage-set presets for ablation arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArmPreset {
    /// No healing stages at all.
    NoRepair,
    /// Text hygiene only: fences, characters, imports.
    PartialRepair,
    /// Every stage.
    FullRepair,
    /// One arm per stage, each running every stage except that one.
    LeaveOneOut,
}

impl ArmPreset {
    /// Parse a preset from its kebab-case name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "no-repair" => Some(Self::NoRepair),
            "partial-repair" => Some(Self::PartialRepair),
            "full-repair" => Some(Self::FullRepair),
            "leave-one-out" => Some(Self::LeaveOneOut),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRepair => "no-repair",
            Self::PartialRepair => "partial-repair",
            Self::FullRepair => "full-repair",
            Self::LeaveOneOut => "leave-one-out",
        }
    }
}

/// One configured ablation arm.
///
/// Either `preset` or `stages` selects the enabled stages; `stages` wins when
/// both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmSpec {
    /// Display name (defaults to the preset name or the stage set).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Stage-set preset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<ArmPreset>,

    /// Explicit stage set (`all`, `none`, `1-3`, `1,2,5`, or stage names).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<String>,

    /// Prompt variant composed for this arm.
    pub variant: PromptVariant,
}

impl ArmSpec {
    pub fn preset(preset: ArmPreset, variant: PromptVariant) -> Self {
        Self {
            name: None,
            preset: Some(preset),
            stages: None,
            variant,
        }
    }
}

/// Modules a generated skill may import.
pub fn default_allowed_imports() -> Vec<String> {
    [
        "random",
        "math",
        "cmath",
        "fractions",
        "decimal",
        "statistics",
        "itertools",
        "functools",
        "string",
        "re",
        "json",
        "collections",
        "sympy",
        "sympy.*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// The three canonical arms: no, partial, and full repair.
pub fn default_arms() -> Vec<ArmSpec> {
    vec![
        ArmSpec::preset(ArmPreset::NoRepair, PromptVariant::ContractAnnotated),
        ArmSpec::preset(ArmPreset::PartialRepair, PromptVariant::ContractAnnotated),
        ArmSpec::preset(ArmPreset::FullRepair, PromptVariant::ContractAnnotated),
    ]
}
