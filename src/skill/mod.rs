//! Skill specifications: the immutable description of what must be generated.
//!
//! Skills are loaded once from a YAML file and shared read-only (behind `Arc`)
//! by every attempt dispatched for them.
//!
//! # File Format
//!
//! ```yaml
//! skills:
//!   - id: fractions-add
//!     description: Add two proper fractions with unlike denominators.
//!     input_kind: free-text
//!     examples:
//!       - input: "1/2 + 1/3"
//!         output: "5/6"
//!     template: |
//!       import random
//!
//!       def generate():
//!           ...
//!
//!       def check(user_answer, item):
//!           ...
//! ```

use crate::error::{MendError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// How a learner submits an answer for a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    /// Free-form text typed by the learner.
    #[default]
    FreeText,
    /// A pick from a list of offered choices.
    StructuredChoice,
    /// A freehand sketch or graph that needs visual grading.
    FreehandGraph,
}

impl InputKind {
    /// Parse an input kind from its kebab-case name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free-text" => Some(Self::FreeText),
            "structured-choice" => Some(Self::StructuredChoice),
            "freehand-graph" => Some(Self::FreehandGraph),
            _ => None,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::FreeText => write!(f, "free-text"),
            InputKind::StructuredChoice => write!(f, "structured-choice"),
            InputKind::FreehandGraph => write!(f, "freehand-graph"),
        }
    }
}

/// One demonstration example shown to the generative service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamplePair {
    /// What the learner is shown.
    pub input: String,
    /// What a correct answer looks like.
    pub output: String,
}

impl ExamplePair {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Immutable description of a skill module to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSpec {
    /// Unique skill identifier (used for file names and record keys).
    pub id: String,
    /// Natural-language topic description.
    #[serde(default)]
    pub description: String,
    /// Expected answer-input kind.
    #[serde(default)]
    pub input_kind: InputKind,
    /// Ordered demonstration example pairs.
    #[serde(default)]
    pub examples: Vec<ExamplePair>,
    /// Template skeleton the generated module should follow.
    #[serde(default)]
    pub template: String,
}

impl SkillSpec {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_kind: InputKind::default(),
            examples: Vec::new(),
            template: String::new(),
        }
    }

    pub fn with_input_kind(mut self, kind: InputKind) -> Self {
        self.input_kind = kind;
        self
    }

    pub fn with_example(mut self, example: ExamplePair) -> Self {
        self.examples.push(example);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct SkillFile {
    #[serde(default)]
    skills: Vec<SkillSpec>,
}

/// Load skill specifications from a YAML file.
///
/// Skill ids must be non-empty and unique. Missing descriptions or templates
/// are accepted here; they surface as `SpecIncompleteError` when a prompt is
/// composed, so the attempt is still recorded.
pub fn load_skills<P: AsRef<Path>>(path: P) -> Result<Vec<SkillSpec>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        MendError::UserError(format!(
            "failed to read skills file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_skills(&content)
}

/// Parse skill specifications from a YAML string.
pub fn parse_skills(yaml: &str) -> Result<Vec<SkillSpec>> {
    let file: SkillFile = serde_yaml::from_str(yaml)
        .map_err(|e| MendError::UserError(format!("failed to parse skills YAML: {}", e)))?;

    let mut seen = HashSet::new();
    for skill in &file.skills {
        if skill.id.trim().is_empty() {
            return Err(MendError::UserError(
                "skills file contains a skill with an empty id".to_string(),
            ));
        }
        if !seen.insert(skill.id.as_str()) {
            return Err(MendError::UserError(format!(
                "skills file defines '{}' more than once",
                skill.id
            )));
        }
    }

    Ok(file.skills)
}
