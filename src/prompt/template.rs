//! `{variable}` substitution for the prompt envelope.
//!
//! # Syntax
//!
//! - `{name}` substitutes the value of `name` (surrounding whitespace ignored)
//! - `{{` renders a literal `{`
//! - `}}` renders a literal `}`; a lone `}` is kept as-is
//!
//! Undefined variables are an error rather than an empty substitution, so a
//! typo in the envelope never silently drops a section. Substituted values
//! are inserted verbatim and never rescanned.

use std::collections::HashMap;
use thiserror::Error;

/// Why a template could not be rendered. Positions are byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("undefined variable '{name}' at position {position} in template")]
    UndefinedVariable { name: String, position: usize },

    #[error("unmatched '{{' at position {position} in template")]
    UnmatchedBrace { position: usize },

    #[error("empty variable name '{{}}' at position {position} in template")]
    EmptyVariableName { position: usize },
}

/// Render `template`, substituting every `{name}` from `variables`.
pub fn render_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(at) = rest.find(['{', '}']) {
        out.push_str(&rest[..at]);
        let position = offset + at;
        let tail = &rest[at..];

        let consumed = if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            tail.len() - after.len()
        } else if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            tail.len() - after.len()
        } else if tail.starts_with('}') {
            out.push('}');
            1
        } else {
            let close = tail
                .find('}')
                .ok_or(TemplateError::UnmatchedBrace { position })?;
            let name = &tail[1..close];
            if name.is_empty() {
                return Err(TemplateError::EmptyVariableName { position });
            }
            let name = name.trim();
            let value = variables
                .get(name)
                .ok_or_else(|| TemplateError::UndefinedVariable {
                    name: name.to_string(),
                    position,
                })?;
            out.push_str(value);
            close + 1
        };

        rest = &tail[consumed..];
        offset = position + consumed;
    }

    out.push_str(rest);
    Ok(out)
}

/// Build a variables map from key-value pairs.
pub fn vars<I, K, V>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_envelope_sections() {
        let vars = vars([("skill_id", "fractions-add"), ("topic", "Add 1/2 + 1/3")]);
        let result = render_template("Skill `{skill_id}`\n<topic>\n{topic}\n</topic>", &vars).unwrap();
        assert_eq!(result, "Skill `fractions-add`\n<topic>\nAdd 1/2 + 1/3\n</topic>");
    }

    #[test]
    fn test_plain_and_empty_templates() {
        let empty = HashMap::new();
        assert_eq!(render_template("", &empty).unwrap(), "");
        assert_eq!(render_template("no placeholders", &empty).unwrap(), "no placeholders");
    }

    #[test]
    fn test_escaped_braces_render_literally() {
        let vars = vars([("x", "value")]);
        let result = render_template("return {{\"correct\": {x}}}", &vars).unwrap();
        assert_eq!(result, "return {\"correct\": value}");
    }

    #[test]
    fn test_lone_closing_brace_is_kept() {
        let result = render_template("a } b", &HashMap::new()).unwrap();
        assert_eq!(result, "a } b");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let vars = vars([("code", "f\"{a}\" and {missing}")]);
        let result = render_template("<template>{code}</template>", &vars).unwrap();
        assert_eq!(result, "<template>f\"{a}\" and {missing}</template>");
    }

    #[test]
    fn test_whitespace_around_names_is_trimmed() {
        let vars = vars([("topic", "sets")]);
        assert_eq!(render_template("{ topic }", &vars).unwrap(), "sets");
    }

    #[test]
    fn test_undefined_variable_reports_position() {
        let err = render_template("topic: {topic}", &HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UndefinedVariable {
                name: "topic".to_string(),
                position: 7,
            }
        );
    }

    #[test]
    fn test_position_accounts_for_multibyte_text_and_escapes() {
        let err = render_template("（{{}}）{x}", &HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UndefinedVariable {
                name: "x".to_string(),
                position: 10,
            }
        );
    }

    #[test]
    fn test_unmatched_and_empty_braces() {
        let empty = HashMap::new();
        assert_eq!(
            render_template("Hello {name", &empty).unwrap_err(),
            TemplateError::UnmatchedBrace { position: 6 }
        );
        assert_eq!(
            render_template("Hello {}", &empty).unwrap_err(),
            TemplateError::EmptyVariableName { position: 6 }
        );
    }

    #[test]
    fn test_error_display() {
        let err = TemplateError::UndefinedVariable {
            name: "foo".to_string(),
            position: 10,
        };
        assert_eq!(err.to_string(), "undefined variable 'foo' at position 10 in template");
        assert_eq!(
            TemplateError::UnmatchedBrace { position: 5 }.to_string(),
            "unmatched '{' at position 5 in template"
        );
        assert_eq!(
            TemplateError::EmptyVariableName { position: 3 }.to_string(),
            "empty variable name '{}' at position 3 in template"
        );
    }
}
