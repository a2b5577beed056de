//! Prompt composition for skill generation.
//!
//! This module provides:
//!
//! - **Template**: `{variable}` substitution for the instruction envelope
//! - **Escape**: delimiter escaping for embedded example text
//! - **Composer**: builds a [`GenerationRequest`] from a [`SkillSpec`](crate::skill::SkillSpec)
//!
//! Composition is pure: the same skill and variant always produce the same
//! request.

mod composer;
mod escape;
mod template;

pub use composer::{GenerationRequest, PromptSections, compose};
pub use escape::{escape, unescape};
pub use template::{TemplateError, render_template, vars};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which instructions accompany the skill description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptVariant {
    /// Topic, examples and template only.
    Bare,
    /// Adds the entry-point and output-shape contract.
    #[default]
    ContractAnnotated,
    /// Adds the contract and the list of defects the healer repairs.
    ContractAnnotatedWithRepairNotice,
}

impl PromptVariant {
    pub const ALL: [PromptVariant; 3] = [
        PromptVariant::Bare,
        PromptVariant::ContractAnnotated,
        PromptVariant::ContractAnnotatedWithRepairNotice,
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bare => "bare",
            Self::ContractAnnotated => "contract-annotated",
            Self::ContractAnnotatedWithRepairNotice => "contract-annotated-with-repair-notice",
        }
    }

    pub fn includes_contract(&self) -> bool {
        !matches!(self, Self::Bare)
    }

    pub fn includes_repair_notice(&self) -> bool {
        matches!(self, Self::ContractAnnotatedWithRepairNotice)
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A skill lacks a field needed to compose its prompt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("skill '{skill_id}' is incomplete: missing {field}")]
pub struct SpecIncompleteError {
    pub skill_id: String,
    pub field: &'static str,
}

/// Why a prompt could not be composed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error(transparent)]
    SpecIncomplete(#[from] SpecIncompleteError),

    /// The built-in envelope references a variable the composer did not bind.
    #[error("prompt envelope is malformed: {0}")]
    Template(#[from] TemplateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_names_round_trip() {
        for variant in PromptVariant::ALL {
            assert_eq!(PromptVariant::from_str(variant.as_str()), Some(variant));
        }
        assert_eq!(PromptVariant::from_str("verbose"), None);
    }

    #[test]
    fn test_variant_serde_uses_kebab_case() {
        let yaml = serde_yaml::to_string(&PromptVariant::ContractAnnotatedWithRepairNotice).unwrap();
        assert_eq!(yaml.trim(), "contract-annotated-with-repair-notice");
    }

    #[test]
    fn test_variant_sections() {
        assert!(!PromptVariant::Bare.includes_contract());
        assert!(PromptVariant::ContractAnnotated.includes_contract());
        assert!(!PromptVariant::ContractAnnotated.includes_repair_notice());
        assert!(PromptVariant::ContractAnnotatedWithRepairNotice.includes_repair_notice());
    }

    #[test]
    fn test_spec_incomplete_message() {
        let err = SpecIncompleteError {
            skill_id: "area-of-circle".to_string(),
            field: "template",
        };
        assert_eq!(err.to_string(), "skill 'area-of-circle' is incomplete: missing template");
        assert_eq!(PromptError::from(err.clone()).to_string(), err.to_string());
    }
}
