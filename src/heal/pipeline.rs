//! The ordered healing pipeline.
//!
//! Stages run strictly in sequence; each stage's output is the next stage's
//! input. The first stage failure marks the artifact unrecoverable and no
//! further stage executes.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use super::fence::FenceStripper;
use super::imports::ImportDeduplicator;
use super::normalize::CharacterNormalizer;
use super::rules::PatternRewriter;
use super::signature::SignatureWrapper;
use super::stage::{ArtifactState, HealStage, StageFailure, StageName, StageSet};
use super::structure::StructuralRepair;
use super::symbols::ForbiddenSymbolRemover;
use crate::config::PipelineSettings;

/// Result of one stage on one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: StageName,
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub elapsed_us: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl StageOutcome {
    pub fn completed(stage: StageName, changed: bool, elapsed_us: u64, notes: Vec<String>) -> Self {
        Self {
            stage,
            changed,
            failure: None,
            elapsed_us,
            notes,
        }
    }

    pub fn failed(stage: StageName, message: impl Into<String>, elapsed_us: u64) -> Self {
        Self {
            stage,
            changed: false,
            failure: Some(message.into()),
            elapsed_us,
            notes: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// A healed artifact ready for execution.
///
/// Not `Clone`; the sandbox executor consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct HealedArtifact {
    text: String,
}

impl HealedArtifact {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Everything one pipeline run produced.
#[derive(Debug)]
pub struct HealReport {
    pub outcomes: Vec<StageOutcome>,
    pub state: ArtifactState,
    pub result: Result<HealedArtifact, StageFailure>,
}

impl HealReport {
    /// Number of stages that changed the text.
    pub fn repair_count(&self) -> u32 {
        self.outcomes.iter().filter(|o| o.changed).count() as u32
    }

    pub fn is_unrecoverable(&self) -> bool {
        self.state == ArtifactState::Unrecoverable
    }
}

/// Build the stage implementation for `name`.
pub fn build_stage(name: StageName, settings: &PipelineSettings) -> Box<dyn HealStage> {
    match name {
        StageName::FenceStripper => Box::new(FenceStripper),
        StageName::CharacterNormalizer => Box::new(CharacterNormalizer),
        StageName::ImportDeduplicator => Box::new(ImportDeduplicator),
        StageName::SignatureWrapper => Box::new(SignatureWrapper),
        StageName::PatternRewriter => {
            Box::new(PatternRewriter::new(settings.pattern_max_passes as usize))
        }
        StageName::ForbiddenSymbolRemover => Box::new(ForbiddenSymbolRemover),
        StageName::StructuralRepair => Box::new(StructuralRepair),
    }
}

/// The configured sequence of enabled stages.
pub struct HealingPipeline {
    stages: Vec<Box<dyn HealStage>>,
    enabled: StageSet,
}

impl std::fmt::Debug for HealingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealingPipeline")
            .field("enabled", &self.enabled.to_string())
            .finish()
    }
}

impl HealingPipeline {
    pub fn new(settings: &PipelineSettings, enabled: StageSet) -> Self {
        let stages = enabled
            .iter()
            .map(|name| build_stage(name, settings))
            .collect();
        Self { stages, enabled }
    }

    pub fn enabled(&self) -> StageSet {
        self.enabled
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every enabled stage over `raw`.
    pub fn run(&self, raw: &str) -> HealReport {
        let mut text = raw.to_string();
        let mut state = ArtifactState::Raw;
        let mut outcomes = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let name = stage.name();
            let started = Instant::now();
            let result = stage.apply(&text);
            let elapsed_us = started.elapsed().as_micros() as u64;

            match result {
                Ok(output) => {
                    let changed = output.text != text;
                    debug!(stage = %name, changed, elapsed_us, "stage completed");
                    outcomes.push(StageOutcome::completed(
                        name,
                        changed,
                        elapsed_us,
                        output.notes,
                    ));
                    text = output.text;
                    state = name.reached_state();
                }
                Err(failure) => {
                    warn!(stage = %name, error = %failure.message, "artifact unrecoverable");
                    outcomes.push(StageOutcome::failed(name, &failure.message, elapsed_us));
                    return HealReport {
                        outcomes,
                        state: ArtifactState::Unrecoverable,
                        result: Err(failure),
                    };
                }
            }
        }

        HealReport {
            outcomes,
            state,
            result: Ok(HealedArtifact::new(text)),
        }
    }
}
