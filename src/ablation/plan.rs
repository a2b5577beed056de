//! Expansion of configured arms into concrete (variant, stage set) pairs.

use std::collections::{HashMap, HashSet};

use crate::config::{ArmPreset, ArmSpec, ExperimentSettings};
use crate::error::{MendError, Result};
use crate::heal::{StageName, StageSet};
use crate::metrics::ArmKey;
use crate::skill::SkillSpec;

/// One concrete arm of the experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm {
    pub name: String,
    pub key: ArmKey,
}

/// One unit of work: a skill run under an arm for a given repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub skill: usize,
    pub arm: usize,
    pub repeat: u32,
}

/// The full set of arms and the repeat count.
#[derive(Debug, Clone)]
pub struct AblationPlan {
    arms: Vec<Arm>,
    repeats: u32,
}

fn preset_stages(preset: ArmPreset) -> StageSet {
    match preset {
        ArmPreset::NoRepair => StageSet::none(),
        ArmPreset::PartialRepair => StageSet::none()
            .with(StageName::FenceStripper)
            .with(StageName::CharacterNormalizer)
            .with(StageName::ImportDeduplicator),
        ArmPreset::FullRepair | ArmPreset::LeaveOneOut => StageSet::all(),
    }
}

/// Expand one configured arm. Leave-one-out yields one arm per stage.
pub fn expand_arm(spec: &ArmSpec) -> Result<Vec<Arm>> {
    let variant = spec.variant;
    let arm = |name: String, stages: StageSet| Arm {
        name,
        key: ArmKey { variant, stages },
    };

    if let Some(stages) = &spec.stages {
        let stages = StageSet::parse(stages)
            .map_err(|e| MendError::UserError(format!("invalid arm stages: {}", e)))?;
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("stages-{}/{}", stages, variant));
        return Ok(vec![arm(name, stages)]);
    }

    let preset = spec.preset.ok_or_else(|| {
        MendError::UserError("arm needs either a preset or a stages list".to_string())
    })?;

    if preset == ArmPreset::LeaveOneOut {
        return Ok(StageName::ALL
            .iter()
            .map(|stage| {
                let name = match &spec.name {
                    Some(base) => format!("{}-without-{}", base, stage),
                    None => format!("without-{}/{}", stage, variant),
                };
                arm(name, StageSet::all().without(*stage))
            })
            .collect());
    }

    let name = spec
        .name
        .clone()
        .unwrap_or_else(|| format!("{}/{}", preset.as_str(), variant));
    Ok(vec![arm(name, preset_stages(preset))])
}

impl AblationPlan {
    /// Build the plan from experiment settings.
    ///
    /// Two arms selecting the same variant and stage set would share one
    /// record, and two arms sharing a name would share attempt ids, so both
    /// are rejected.
    pub fn from_settings(settings: &ExperimentSettings) -> Result<Self> {
        let mut arms = Vec::new();
        for spec in &settings.arms {
            arms.extend(expand_arm(spec)?);
        }
        Self::new(arms, settings.repeats)
    }

    pub fn new(arms: Vec<Arm>, repeats: u32) -> Result<Self> {
        if arms.is_empty() {
            return Err(MendError::UserError(
                "experiment defines no arms".to_string(),
            ));
        }

        let mut by_key: HashMap<ArmKey, &str> = HashMap::new();
        let mut names: HashSet<&str> = HashSet::new();
        for arm in &arms {
            if !names.insert(&arm.name) {
                return Err(MendError::UserError(format!(
                    "arm name '{}' is used more than once; arm names must be unique",
                    arm.name
                )));
            }
            if let Some(existing) = by_key.insert(arm.key, &arm.name) {
                return Err(MendError::UserError(format!(
                    "arms '{}' and '{}' both select {}",
                    existing, arm.name, arm.key
                )));
            }
        }

        Ok(Self {
            arms,
            repeats: repeats.max(1),
        })
    }

    pub fn arms(&self) -> &[Arm] {
        &self.arms
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }

    /// Attempts each arm receives for `skill_count` skills.
    pub fn attempts_per_arm(&self, skill_count: usize) -> u64 {
        skill_count as u64 * u64::from(self.repeats)
    }

    /// Every (skill, arm, repeat) triple, arm-major.
    pub fn dispatches(&self, skill_count: usize) -> impl Iterator<Item = Dispatch> + '_ {
        (0..self.arms.len()).flat_map(move |arm| {
            (0..skill_count).flat_map(move |skill| {
                (0..self.repeats).map(move |repeat| Dispatch { skill, arm, repeat })
            })
        })
    }

    /// Stable attempt id for a dispatch.
    pub fn attempt_id(&self, dispatch: Dispatch, skills: &[SkillSpec]) -> String {
        format!(
            "{}/{}/{}",
            self.arms[dispatch.arm].name, skills[dispatch.skill].id, dispatch.repeat
        )
    }
}
