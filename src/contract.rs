//! The fixed entry-point contract every healed artifact must satisfy.
//!
//! A skill module exposes exactly two top-level functions. The names are
//! checked structurally by the signature wrapper and the sandbox; nothing
//! discovers callables by naming convention at run time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two required entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryPoint {
    /// `def generate():` produces one quiz item.
    Generate,
    /// `def check(user_answer, item):` grades an answer.
    Check,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 2] = [EntryPoint::Generate, EntryPoint::Check];

    /// The required Python function name.
    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::Generate => "generate",
            EntryPoint::Check => "check",
        }
    }

    /// The header synthesized when a body is found without one.
    pub fn header(&self) -> &'static str {
        match self {
            EntryPoint::Generate => "def generate():",
            EntryPoint::Check => "def check(user_answer, item):",
        }
    }

    /// Parameter names in declaration order.
    pub fn params(&self) -> &'static [&'static str] {
        match self {
            EntryPoint::Generate => &[],
            EntryPoint::Check => &["user_answer", "item"],
        }
    }

    /// Frequently generated names that mean this entry point.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            EntryPoint::Generate => &[
                "generate_question",
                "generate_problem",
                "generate_item",
                "make_question",
                "create_question",
                "produce_item",
            ],
            EntryPoint::Check => &[
                "check_answer",
                "verify_answer",
                "validate_answer",
                "grade",
                "grade_answer",
                "evaluate_answer",
            ],
        }
    }

    /// Python expression returned when a guarded body raises.
    pub fn fallback_value(&self) -> &'static str {
        match self {
            EntryPoint::Generate => r#"{"error": f"item could not be produced: {exc}"}"#,
            EntryPoint::Check => {
                r#"{"correct": False, "feedback": f"answer could not be evaluated: {exc}"}"#
            }
        }
    }

    /// Resolve a function name, either exact or a known alias.
    pub fn resolve(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|entry| entry.name() == name || entry.aliases().contains(&name))
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fields of the dict returned by `generate()`.
pub mod fields {
    pub const QUESTION: &str = "question";
    pub const ANSWER: &str = "answer";
    pub const VISUAL_GRADING: &str = "requires_visual_grading";
    pub const CHOICES: &str = "choices";
    pub const ERROR: &str = "error";
    pub const CORRECT: &str = "correct";
    pub const FEEDBACK: &str = "feedback";
}

/// Contract summary embedded in annotated prompts.
pub fn contract_summary() -> String {
    format!(
        "The module must define exactly these two top-level functions:\n\
         - `{}` returning a dict with a non-empty \"{}\" string and either an \"{}\" \
         or \"{}\": True.\n\
         - `{}` returning a dict with a boolean \"{}\" and an optional \"{}\" string.\n\
         Use only the Python standard library and sympy. Do not print, read input, \
         open files, or access the network.",
        EntryPoint::Generate.header(),
        fields::QUESTION,
        fields::ANSWER,
        fields::VISUAL_GRADING,
        EntryPoint::Check.header(),
        fields::CORRECT,
        fields::FEEDBACK,
    )
}
