//! Stage 1: strip delimiter-fenced block markup.

use super::stage::{HealStage, StageFailure, StageName, StageOutput};

/// Fence languages treated as the artifact's own language.
const PYTHON_TAGS: &[&str] = &["", "python", "py", "python3", "py3"];

/// Removes triple-backtick / triple-tilde fences and the prose around them.
///
/// When several fenced blocks are present, Python-tagged (or untagged)
/// blocks are kept and joined; if none is tagged as Python, every block is
/// kept. A lone fence line is removed along with whichever side of it is
/// prose.
#[derive(Debug, Default, Clone, Copy)]
pub struct FenceStripper;

struct Block<'a> {
    tag: String,
    lines: Vec<&'a str>,
}

fn fence_tag(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = trimmed
        .strip_prefix("```")
        .or_else(|| trimmed.strip_prefix("~~~"))?;
    let rest = rest.trim_start_matches(['`', '~']);
    Some(rest.trim().to_ascii_lowercase())
}

fn is_python_tag(tag: &str) -> bool {
    // "```python title=solution.py" style info strings
    let lang = tag.split_whitespace().next().unwrap_or("");
    PYTHON_TAGS.contains(&lang)
}

impl HealStage for FenceStripper {
    fn name(&self) -> StageName {
        StageName::FenceStripper
    }

    fn apply(&self, text: &str) -> Result<StageOutput, StageFailure> {
        let lines: Vec<&str> = text.split('\n').collect();
        let fences: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| fence_tag(line).is_some())
            .map(|(i, _)| i)
            .collect();

        match fences.len() {
            0 => Ok(StageOutput::new(text)),
            1 => Ok(strip_lone_fence(&lines, fences[0])),
            _ => Ok(strip_blocks(&lines, &fences)),
        }
    }
}

fn strip_lone_fence(lines: &[&str], at: usize) -> StageOutput {
    let tag = fence_tag(lines[at]).unwrap_or_default();
    let before = &lines[..at];
    let after = &lines[at + 1..];
    let weight = |part: &[&str]| part.iter().filter(|l| !l.trim().is_empty()).count();

    let keep_after = !tag.is_empty() || weight(after) >= weight(before);
    let (kept, dropped) = if keep_after { (after, before) } else { (before, after) };

    let mut output = StageOutput::new(finish(kept.join("\n")))
        .with_note("removed unmatched fence marker");
    let prose = weight(dropped);
    if prose > 0 {
        output = output.with_note(format!("dropped {} line(s) of surrounding prose", prose));
    }
    output
}

fn strip_blocks(lines: &[&str], fences: &[usize]) -> StageOutput {
    let mut blocks: Vec<Block> = Vec::new();
    for pair in fences.chunks(2) {
        let open = pair[0];
        let close = pair.get(1).copied().unwrap_or(lines.len());
        blocks.push(Block {
            tag: fence_tag(lines[open]).unwrap_or_default(),
            lines: lines[open + 1..close].to_vec(),
        });
    }

    let python_blocks = blocks.iter().filter(|b| is_python_tag(&b.tag)).count();
    let selected: Vec<&Block> = if python_blocks > 0 {
        blocks.iter().filter(|b| is_python_tag(&b.tag)).collect()
    } else {
        blocks.iter().collect()
    };

    let body = selected
        .iter()
        .map(|b| b.lines.join("\n").trim_matches('\n').to_string())
        .filter(|b| !b.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let prose = lines
        .iter()
        .enumerate()
        .filter(|(i, l)| !l.trim().is_empty() && !inside_any(*i, fences, lines.len()))
        .count();

    let mut output = StageOutput::new(finish(body)).with_note(format!(
        "removed {} fence marker(s), kept {} of {} block(s)",
        fences.len(),
        selected.len(),
        blocks.len()
    ));
    if prose > 0 {
        output = output.with_note(format!("dropped {} line(s) of surrounding prose", prose));
    }
    output
}

fn inside_any(index: usize, fences: &[usize], len: usize) -> bool {
    fences.chunks(2).any(|pair| {
        let close = pair.get(1).copied().unwrap_or(len);
        index >= pair[0] && index <= close
    })
}

fn finish(mut body: String) -> String {
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(text: &str) -> StageOutput {
        FenceStripper.apply(text).unwrap()
    }

    #[test]
    fn test_no_fence_is_unchanged() {
        let text = "def generate():\n    return {}\n";
        assert_eq!(strip(text).text, text);
    }

    #[test]
    fn test_single_block_with_prose() {
        let text = "Here is the module:\n```python\nimport random\nx = 1\n```\nHope this helps!";
        let out = strip(text);
        assert_eq!(out.text, "import random\nx = 1\n");
        assert!(out.notes.iter().any(|n| n.contains("prose")));
    }

    #[test]
    fn test_prefers_python_blocks() {
        let text = "```bash\npip install sympy\n```\n```python\na = 1\n```\n```py\nb = 2\n```";
        assert_eq!(strip(text).text, "a = 1\n\nb = 2\n");
    }

    #[test]
    fn test_keeps_all_blocks_when_none_tagged_python() {
        let text = "```text\na = 1\n```\n~~~\nb = 2\n~~~";
        // `~~~` with no tag counts as untagged, which is python
        assert_eq!(strip(text).text, "b = 2\n");

        let text = "```text\na = 1\n```\n```js\nb = 2\n```";
        assert_eq!(strip(text).text, "a = 1\n\nb = 2\n");
    }

    #[test]
    fn test_unclosed_block_runs_to_end() {
        let text = "Sure.\n```python\na = 1\n```\nMore:\n```python\nb = 2";
        assert_eq!(strip(text).text, "a = 1\n\nb = 2\n");
    }

    #[test]
    fn test_lone_opening_fence() {
        let text = "Sure thing\n```python\na = 1\nb = 2";
        assert_eq!(strip(text).text, "a = 1\nb = 2\n");
    }

    #[test]
    fn test_lone_closing_fence() {
        let text = "a = 1\nb = 2\n```\n";
        assert_eq!(strip(text).text, "a = 1\nb = 2\n");
    }

    #[test]
    fn test_idempotent_after_strip() {
        let once = strip("```python\na = 1\n```").text;
        assert_eq!(strip(&once).text, once);
    }
}
