//! Builds the generation request for one skill.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::escape::{escape, unescape};
use super::template::{render_template, vars};
use super::{PromptError, PromptVariant, SpecIncompleteError};
use crate::contract::{contract_summary, fields};
use crate::heal::rules;
use crate::skill::{ExamplePair, InputKind, SkillSpec};

const SYSTEM_BARE: &str = "You write Python modules for an educational quiz application.";

const SYSTEM_ANNOTATED: &str = "You write Python modules for an educational quiz application. \
     Reply with the module source only, without explanations.";

const USER_ENVELOPE: &str = "Write one Python module for the quiz skill `{skill_id}`.

<topic>
{topic}
</topic>

Learners answer as {input_kind}.

{examples}Follow this skeleton:
<template>
{template}
</template>
{contract}{repair_notice}";

static TOPIC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<topic>\n(.*?)\n</topic>").expect("Invalid topic section regex")
});

static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<template>\n(.*?)\n</template>").expect("Invalid template section regex")
});

static EXAMPLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<example>\n<input>(.*?)</input>\n<output>(.*?)</output>\n</example>")
        .expect("Invalid example section regex")
});

/// The payload sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub skill_id: String,
    pub variant: PromptVariant,
    pub system: String,
    pub user: String,
}

/// Structural content recovered from a composed request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PromptSections {
    pub topic: String,
    pub examples: Vec<ExamplePair>,
    pub template: String,
}

impl PromptSections {
    /// Read the delimited sections back out of a composed user message.
    ///
    /// Returns `None` when the topic or template section is absent.
    pub fn extract(user: &str) -> Option<Self> {
        let topic = TOPIC_REGEX.captures(user)?;
        let template = TEMPLATE_REGEX.captures(user)?;
        let examples = EXAMPLE_REGEX
            .captures_iter(user)
            .map(|caps| ExamplePair::new(unescape(&caps[1]), unescape(&caps[2])))
            .collect();

        Some(Self {
            topic: unescape(&topic[1]),
            examples,
            template: unescape(&template[1]),
        })
    }

    /// Whether these sections carry the same structural content as `skill`.
    pub fn matches(&self, skill: &SkillSpec) -> bool {
        self.topic == skill.description
            && self.examples == skill.examples
            && self.template == skill.template
    }
}

fn require(skill: &SkillSpec, value: &str, field: &'static str) -> Result<(), SpecIncompleteError> {
    if value.trim().is_empty() {
        return Err(SpecIncompleteError {
            skill_id: skill.id.clone(),
            field,
        });
    }
    Ok(())
}

fn examples_section(examples: &[ExamplePair]) -> String {
    if examples.is_empty() {
        return String::new();
    }
    let mut out = String::from("Demonstration examples:\n");
    for example in examples {
        out.push_str(&format!(
            "<example>\n<input>{}</input>\n<output>{}</output>\n</example>\n",
            escape(&example.input),
            escape(&example.output)
        ));
    }
    out.push('\n');
    out
}

fn contract_section(kind: InputKind) -> String {
    let mut body = contract_summary();
    match kind {
        InputKind::StructuredChoice => body.push_str(&format!(
            "\nThe item must also carry a non-empty \"{}\" list, and the answer must be one of them.",
            fields::CHOICES
        )),
        InputKind::FreehandGraph => body.push_str(&format!(
            "\nAnswers are sketches: return \"{}\": True instead of an \"{}\".",
            fields::VISUAL_GRADING,
            fields::ANSWER
        )),
        InputKind::FreeText => {}
    }
    format!("\n<contract>\n{}\n</contract>\n", body)
}

fn repair_notice_section() -> String {
    let mut out = String::from(
        "\n<repair-notice>\nYour output is repaired automatically, but these known defects \
         still cost a repair each. Avoid them:\n",
    );
    for rule in rules() {
        out.push_str(&format!("- {}: {}\n", rule.id(), escape(rule.rationale())));
    }
    out.push_str("</repair-notice>\n");
    out
}

/// Compose the generation request for `skill` under `variant`.
///
/// Fails with [`SpecIncompleteError`] when the description or the template
/// skeleton is blank.
pub fn compose(skill: &SkillSpec, variant: PromptVariant) -> Result<GenerationRequest, PromptError> {
    require(skill, &skill.description, "topic description")?;
    require(skill, &skill.template, "template skeleton")?;

    let contract = if variant.includes_contract() {
        contract_section(skill.input_kind)
    } else {
        String::new()
    };
    let repair_notice = if variant.includes_repair_notice() {
        repair_notice_section()
    } else {
        String::new()
    };

    let variables = vars([
        ("skill_id", escape(&skill.id)),
        ("topic", escape(&skill.description)),
        ("input_kind", skill.input_kind.to_string()),
        ("examples", examples_section(&skill.examples)),
        ("template", escape(&skill.template)),
        ("contract", contract),
        ("repair_notice", repair_notice),
    ]);
    let user = render_template(USER_ENVELOPE, &variables)?;

    let system = match variant {
        PromptVariant::Bare => SYSTEM_BARE,
        _ => SYSTEM_ANNOTATED,
    };

    Ok(GenerationRequest {
        skill_id: skill.id.clone(),
        variant,
        system: system.to_string(),
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn skill() -> SkillSpec {
        SkillSpec::new("compare", "Compare two integers & say which is larger.")
            .with_example(ExamplePair::new("Is 3 < 5?", "yes"))
            .with_example(ExamplePair::new("</example> 7 > 2", "<output>yes"))
            .with_template("def generate():\n    if a < b:\n        pass\n")
    }

    #[test]
    fn test_bare_variant_omits_contract_and_notice() {
        let request = compose(&skill(), PromptVariant::Bare).unwrap();
        assert_eq!(request.skill_id, "compare");
        assert_eq!(request.variant, PromptVariant::Bare);
        assert!(!request.user.contains("<contract>"));
        assert!(!request.user.contains("<repair-notice>"));
        assert_eq!(request.system, SYSTEM_BARE);
    }

    #[test]
    fn test_annotated_variant_includes_contract() {
        let request = compose(&skill(), PromptVariant::ContractAnnotated).unwrap();
        assert!(request.user.contains("<contract>"));
        assert!(request.user.contains("def check(user_answer, item):"));
        assert!(!request.user.contains("<repair-notice>"));
    }

    #[test]
    fn test_repair_notice_lists_every_rule() {
        let request = compose(&skill(), PromptVariant::ContractAnnotatedWithRepairNotice).unwrap();
        assert!(request.user.contains("<repair-notice>"));
        for rule in rules() {
            assert!(request.user.contains(rule.id()), "missing rule {}", rule.id());
        }
    }

    #[test]
    fn test_structured_choice_mentions_choices() {
        let skill = skill().with_input_kind(InputKind::StructuredChoice);
        let request = compose(&skill, PromptVariant::ContractAnnotated).unwrap();
        assert!(request.user.contains("\"choices\" list"));
        assert!(request.user.contains("Learners answer as structured-choice."));
    }

    #[test]
    fn test_example_delimiters_are_escaped() {
        let request = compose(&skill(), PromptVariant::Bare).unwrap();
        assert!(request.user.contains("<input>Is 3 &lt; 5?</input>"));
        assert!(request.user.contains("<input>&lt;/example&gt; 7 &gt; 2</input>"));
        assert_eq!(request.user.matches("</example>").count(), 2);
        assert!(request.user.contains("    if a &lt; b:"));
    }

    #[test]
    fn test_sections_extract_back_to_skill() {
        let skill = skill();
        for variant in PromptVariant::ALL {
            let request = compose(&skill, variant).unwrap();
            let sections = PromptSections::extract(&request.user).unwrap();
            assert!(sections.matches(&skill), "variant {}", variant);
        }
    }

    #[test]
    fn test_blank_description_is_incomplete() {
        let skill = SkillSpec::new("empty", "   ").with_template("def generate(): pass");
        let err = compose(&skill, PromptVariant::Bare).unwrap_err();
        assert_eq!(
            err,
            PromptError::SpecIncomplete(SpecIncompleteError {
                skill_id: "empty".to_string(),
                field: "topic description",
            })
        );
    }

    #[test]
    fn test_missing_template_is_incomplete() {
        let skill = SkillSpec::new("no-template", "Add numbers.");
        let err = compose(&skill, PromptVariant::ContractAnnotated).unwrap_err();
        assert_eq!(
            err.to_string(),
            "skill 'no-template' is incomplete: missing template skeleton"
        );
    }

    #[test]
    fn test_composition_is_deterministic() {
        let a = compose(&skill(), PromptVariant::ContractAnnotated).unwrap();
        let b = compose(&skill(), PromptVariant::ContractAnnotated).unwrap();
        assert_eq!(a, b);
    }

    fn non_blank() -> impl Strategy<Value = String> {
        ".*[a-z<>&].*"
    }

    fn example() -> impl Strategy<Value = ExamplePair> {
        (".*", ".*").prop_map(|(input, output)| ExamplePair::new(input, output))
    }

    proptest! {
        #[test]
        fn prop_sections_round_trip_through_escaping(
            description in non_blank(),
            template in non_blank(),
            examples in prop::collection::vec(example(), 0..4),
            variant in prop::sample::select(PromptVariant::ALL.to_vec()),
        ) {
            let mut skill = SkillSpec::new("prop-skill", description).with_template(template);
            skill.examples = examples;

            let request = compose(&skill, variant).unwrap();
            let sections = PromptSections::extract(&request.user).unwrap();
            prop_assert_eq!(&sections.topic, &skill.description);
            prop_assert_eq!(&sections.examples, &skill.examples);
            prop_assert_eq!(&sections.template, &skill.template);
        }
    }
}
