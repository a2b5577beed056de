//! Stage 3: drop repeated top-level import lines.

use std::collections::HashSet;

use super::lexer;
use super::stage::{HealStage, StageFailure, StageName, StageOutput};

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportDeduplicator;

/// Normalized key for a top-level import statement, if `line` is one.
///
/// Parenthesized and backslash-continued imports span several lines and
/// are left alone.
pub fn import_key(line: &str) -> Option<String> {
    if line.starts_with([' ', '\t']) {
        return None;
    }
    let code = lexer::code_of_line(line);
    let code = code.trim();
    let is_import = code.starts_with("import ")
        || (code.starts_with("from ") && code.contains(" import "));
    if !is_import || code.contains('(') || code.ends_with('\\') {
        return None;
    }
    Some(code.split_whitespace().collect::<Vec<_>>().join(" "))
}

impl HealStage for ImportDeduplicator {
    fn name(&self) -> StageName {
        StageName::ImportDeduplicator
    }

    fn apply(&self, text: &str) -> Result<StageOutput, StageFailure> {
        let infos = lexer::line_info(text);
        let mut seen = HashSet::new();
        let mut removed = Vec::new();
        let mut kept = Vec::new();

        for (line, info) in text.split('\n').zip(infos) {
            if info.is_logical_start()
                && let Some(key) = import_key(line)
                && !seen.insert(key.clone())
            {
                removed.push(key);
                continue;
            }
            kept.push(line);
        }

        let notes = removed
            .into_iter()
            .map(|key| format!("removed duplicate `{}`", key))
            .collect();
        Ok(StageOutput::new(kept.join("\n")).with_notes(notes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup(text: &str) -> StageOutput {
        ImportDeduplicator.apply(text).unwrap()
    }

    #[test]
    fn test_keeps_first_occurrence_in_order() {
        let text = "import random\nimport math\nimport random\nfrom fractions import Fraction\nimport  math\n";
        let out = dedup(text);
        assert_eq!(out.text, "import random\nimport math\nfrom fractions import Fraction\n");
        assert_eq!(out.notes.len(), 2);
    }

    #[test]
    fn test_trailing_comment_ignored_in_key() {
        let out = dedup("import random  # rng\nimport random\n");
        assert_eq!(out.text, "import random  # rng\n");
    }

    #[test]
    fn test_nested_imports_untouched() {
        let text = "import math\ndef f():\n    import math\n    return math.pi\n";
        assert_eq!(dedup(text).text, text);
    }

    #[test]
    fn test_import_text_inside_string_untouched() {
        let text = "import math\ndoc = \"\"\"\nimport math\n\"\"\"\n";
        assert_eq!(dedup(text).text, text);
    }

    #[test]
    fn test_parenthesized_imports_untouched() {
        let text = "from math import (\n    sqrt,\n)\nfrom math import (\n    sqrt,\n)\n";
        assert_eq!(dedup(text).text, text);
    }
}
