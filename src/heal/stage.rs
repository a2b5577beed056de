//! Stage identities, stage sets, and the stage contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The seven healing stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    FenceStripper,
    CharacterNormalizer,
    ImportDeduplicator,
    SignatureWrapper,
    PatternRewriter,
    ForbiddenSymbolRemover,
    StructuralRepair,
}

impl StageName {
    /// Every stage in pipeline order.
    pub const ALL: [StageName; 7] = [
        StageName::FenceStripper,
        StageName::CharacterNormalizer,
        StageName::ImportDeduplicator,
        StageName::SignatureWrapper,
        StageName::PatternRewriter,
        StageName::ForbiddenSymbolRemover,
        StageName::StructuralRepair,
    ];

    /// 1-based position in the pipeline.
    pub fn index(&self) -> u8 {
        match self {
            StageName::FenceStripper => 1,
            StageName::CharacterNormalizer => 2,
            StageName::ImportDeduplicator => 3,
            StageName::SignatureWrapper => 4,
            StageName::PatternRewriter => 5,
            StageName::ForbiddenSymbolRemover => 6,
            StageName::StructuralRepair => 7,
        }
    }

    /// Look up a stage by its 1-based position.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index).checked_sub(1)?).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::FenceStripper => "fence-stripper",
            StageName::CharacterNormalizer => "character-normalizer",
            StageName::ImportDeduplicator => "import-deduplicator",
            StageName::SignatureWrapper => "signature-wrapper",
            StageName::PatternRewriter => "pattern-rewriter",
            StageName::ForbiddenSymbolRemover => "forbidden-symbol-remover",
            StageName::StructuralRepair => "structural-repair",
        }
    }

    /// Look up a stage by its kebab-case name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == name)
    }

    /// The artifact state reached once this stage has run.
    pub fn reached_state(&self) -> ArtifactState {
        match self {
            StageName::FenceStripper => ArtifactState::FenceStripped,
            StageName::CharacterNormalizer => ArtifactState::Normalized,
            StageName::ImportDeduplicator => ArtifactState::ImportClean,
            StageName::SignatureWrapper => ArtifactState::SignatureComplete,
            StageName::PatternRewriter => ArtifactState::PatternClean,
            StageName::ForbiddenSymbolRemover => ArtifactState::SymbolClean,
            StageName::StructuralRepair => ArtifactState::StructurallyValid,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an artifact sits in the per-attempt state machine.
///
/// Transitions are strictly forward; `Unrecoverable` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactState {
    Raw,
    FenceStripped,
    Normalized,
    ImportClean,
    SignatureComplete,
    PatternClean,
    SymbolClean,
    StructurallyValid,
    Unrecoverable,
}

/// Error returned when a stage-set expression cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid stage set '{input}': {reason}")]
pub struct StageSetError {
    pub input: String,
    pub reason: String,
}

/// A set of enabled healing stages.
///
/// Parsed from `all`, `none`, ranges (`1-3`), lists (`1,2,5`), or stage
/// names (`fence-stripper,structural-repair`). Serialized in the same
/// compact form so records stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StageSet(u8);

impl StageSet {
    const MASK: u8 = 0b0111_1111;

    pub fn all() -> Self {
        Self(Self::MASK)
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn contains(&self, stage: StageName) -> bool {
        self.0 & Self::bit(stage) != 0
    }

    pub fn with(self, stage: StageName) -> Self {
        Self(self.0 | Self::bit(stage))
    }

    pub fn without(self, stage: StageName) -> Self {
        Self(self.0 & !Self::bit(stage))
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Enabled stages in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = StageName> + '_ {
        StageName::ALL
            .into_iter()
            .filter(move |stage| self.contains(*stage))
    }

    /// Parse a stage-set expression.
    pub fn parse(input: &str) -> Result<Self, StageSetError> {
        let trimmed = input.trim();
        let err = |reason: String| StageSetError {
            input: input.to_string(),
            reason,
        };

        match trimmed {
            "all" => return Ok(Self::all()),
            "none" | "" => return Ok(Self::none()),
            _ => {}
        }

        let mut set = Self::none();
        for token in trimmed.split(',').map(str::trim) {
            if token.is_empty() {
                return Err(err("empty entry".to_string()));
            }

            if let Some(stage) = StageName::from_name(token) {
                set = set.with(stage);
                continue;
            }

            let (start, end) = match token.split_once('-') {
                Some((a, b)) => (parse_index(a), parse_index(b)),
                None => (parse_index(token), parse_index(token)),
            };
            let (Some(start), Some(end)) = (start, end) else {
                return Err(err(format!(
                    "'{}' is neither a stage name nor a stage number 1-7",
                    token
                )));
            };
            if start > end {
                return Err(err(format!("range '{}' runs backwards", token)));
            }
            for index in start..=end {
                if let Some(stage) = StageName::from_index(index) {
                    set = set.with(stage);
                }
            }
        }

        Ok(set)
    }

    fn bit(stage: StageName) -> u8 {
        1 << (stage.index() - 1)
    }
}

fn parse_index(s: &str) -> Option<u8> {
    s.trim().parse::<u8>().ok().filter(|n| (1..=7).contains(n))
}

impl Default for StageSet {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == Self::MASK {
            return f.write_str("all");
        }
        if self.0 == 0 {
            return f.write_str("none");
        }

        // Collapse runs of consecutive stages into ranges: 1-3,5,6-7
        let indices: Vec<u8> = self.iter().map(|stage| stage.index()).collect();
        let mut parts = Vec::new();
        let mut i = 0;
        while i < indices.len() {
            let start = indices[i];
            let mut end = start;
            while i + 1 < indices.len() && indices[i + 1] == end + 1 {
                i += 1;
                end = indices[i];
            }
            if start == end {
                parts.push(start.to_string());
            } else {
                parts.push(format!("{}-{}", start, end));
            }
            i += 1;
        }
        f.write_str(&parts.join(","))
    }
}

impl TryFrom<String> for StageSet {
    type Error = StageSetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StageSet> for String {
    fn from(value: StageSet) -> Self {
        value.to_string()
    }
}

/// Text produced by one stage, with notes describing what it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub text: String,
    pub notes: Vec<String>,
}

impl StageOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes.extend(notes);
        self
    }
}

/// A stage's signal that the artifact cannot proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage}: {message}")]
pub struct StageFailure {
    pub stage: StageName,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: StageName, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// One stateless healing stage.
///
/// A stage receives the current text and returns the (possibly unchanged)
/// next text, or a failure that makes the artifact unrecoverable.
pub trait HealStage: Send + Sync {
    fn name(&self) -> StageName;

    fn apply(&self, text: &str) -> Result<StageOutput, StageFailure>;
}
