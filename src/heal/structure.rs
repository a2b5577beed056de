//! Stage 7: parse, patch once if needed, and guard risky entry-point bodies.

use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::{Node, Parser, Tree};

use super::lexer;
use super::stage::{HealStage, StageFailure, StageName, StageOutput};
use crate::contract::EntryPoint;

/// Calls that raise on malformed user input or generated values.
pub const RISKY_CALLS: &[&str] = &[
    "int",
    "float",
    "eval",
    "Fraction",
    "Decimal",
    "sympify",
    "parse_expr",
    "simplify",
];

/// Tokens the bounded patch may insert at a MISSING node.
const INSERTABLE_TOKENS: &[&str] = &[")", "]", "}", ":"];

static BLOCK_OPENER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:async\s+)?(?:(?:def|class|if|elif|for|while|except|with)\b.*|else|try|finally|except)\s*$",
    )
    .expect("Invalid block opener regex")
});

/// Parses the artifact with the Python grammar.
///
/// When parsing fails, exactly one text-level patch is attempted at the
/// first error location; if the re-parse still fails the artifact is
/// unrecoverable. When parsing succeeds, `generate`/`check` bodies holding
/// unguarded risky calls are wrapped in a `try` block that returns the
/// structured failure value.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralRepair;

fn failure(message: impl Into<String>) -> StageFailure {
    StageFailure::new(StageName::StructuralRepair, message)
}

fn parse(text: &str) -> Result<Tree, StageFailure> {
    let mut parser = Parser::new();
    parser
        .set_language(tree_sitter_python::language())
        .map_err(|e| failure(format!("python grammar unavailable: {:?}", e)))?;
    parser
        .parse(text, None)
        .ok_or_else(|| failure("parser produced no tree"))
}

/// The first MISSING or ERROR node in document order.
fn first_defect(node: Node) -> Option<Node> {
    if node.is_missing() || node.is_error() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_defect)
}

/// Location and kind of the first syntax defect.
#[derive(Debug, Clone)]
pub struct SyntaxDefect {
    pub row: usize,
    pub byte: usize,
    /// Token kind for MISSING nodes.
    pub missing: Option<String>,
}

impl SyntaxDefect {
    fn from_tree(tree: &Tree) -> Option<Self> {
        let node = first_defect(tree.root_node())?;
        Some(Self {
            row: node.start_position().row,
            byte: node.start_byte(),
            missing: node.is_missing().then(|| node.kind().to_string()),
        })
    }

    fn describe(&self) -> String {
        match &self.missing {
            Some(token) => format!("line {}: missing `{}`", self.row + 1, token),
            None => format!("line {}: syntax error", self.row + 1),
        }
    }
}

/// Try the single bounded patch for `defect`.
///
/// Returns the patched text and a note, or `None` when no patch applies.
pub fn bounded_patch(text: &str, defect: &SyntaxDefect) -> Option<(String, String)> {
    if let Some(token) = &defect.missing
        && INSERTABLE_TOKENS.contains(&token.as_str())
        && text.is_char_boundary(defect.byte)
    {
        let lines: Vec<&str> = text.split('\n').collect();
        let line_start = text[..defect.byte].rfind('\n').map_or(0, |i| i + 1);
        // A token expected at the start of a line belongs at the end of the
        // previous line of code.
        if text[line_start..defect.byte].trim().is_empty()
            && let Some(prev) = (0..defect.row.min(lines.len()))
                .rev()
                .find(|r| !lexer::is_blank_or_comment(lines[*r]))
        {
            return Some((
                append_to_code(&lines, prev, token),
                format!("inserted missing `{}` on line {}", token, prev + 1),
            ));
        }
        let mut patched = text.to_string();
        patched.insert_str(defect.byte, token);
        return Some((
            patched,
            format!("inserted missing `{}` on line {}", token, defect.row + 1),
        ));
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let candidates = candidate_rows(&lines, defect.row);

    for &row in &candidates {
        let code = lexer::code_of_line(lines[row]);
        let code = code.trim_end();
        if BLOCK_OPENER_REGEX.is_match(code) && !code.ends_with(':') && unclosed(code).is_empty() {
            let patched = append_to_code(&lines, row, ":");
            return Some((patched, format!("added missing `:` on line {}", row + 1)));
        }
    }

    for &row in &candidates {
        let code = lexer::code_of_line(lines[row]);
        let closers = unclosed(&code);
        if !closers.is_empty() {
            let patched = append_to_code(&lines, row, &closers);
            return Some((
                patched,
                format!("closed `{}` on line {}", closers, row + 1),
            ));
        }
    }

    None
}

fn candidate_rows(lines: &[&str], row: usize) -> Vec<usize> {
    let row = row.min(lines.len().saturating_sub(1));
    let mut rows = vec![row];
    if let Some(prev) = (0..row).rev().find(|r| !lexer::is_blank_or_comment(lines[*r])) {
        rows.push(prev);
    }
    rows
}

/// Closing brackets needed to balance the code of one line.
fn unclosed(code: &str) -> String {
    let mut stack = Vec::new();
    for seg in lexer::segments(code) {
        if !seg.is_code() {
            continue;
        }
        for ch in seg.text.chars() {
            match ch {
                '(' => stack.push(')'),
                '[' => stack.push(']'),
                '{' => stack.push('}'),
                ')' | ']' | '}' => {
                    if stack.last() == Some(&ch) {
                        stack.pop();
                    }
                }
                _ => {}
            }
        }
    }
    stack.iter().rev().collect()
}

fn append_to_code(lines: &[&str], row: usize, suffix: &str) -> String {
    let line = lines[row];
    let code_len = lexer::code_of_line(line).trim_end().len();
    let patched_line = format!("{}{}{}", &line[..code_len], suffix, &line[code_len..]);
    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    out[row] = patched_line;
    out.join("\n")
}

fn node_text<'a>(node: Node, src: &'a str) -> &'a str {
    node.utf8_text(src.as_bytes()).unwrap_or("")
}

fn has_unguarded_risky_call(node: Node, src: &str) -> bool {
    match node.kind() {
        "try_statement" | "function_definition" | "class_definition" | "lambda" => return false,
        "call" => {
            let callee = node.child_by_field_name("function").map(|f| match f.kind() {
                "attribute" => f
                    .child_by_field_name("attribute")
                    .map_or("", |a| node_text(a, src)),
                _ => node_text(f, src),
            });
            if callee.is_some_and(|name| RISKY_CALLS.contains(&name)) {
                return true;
            }
        }
        _ => {}
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .any(|child| has_unguarded_risky_call(child, src))
}

fn already_guarded(body: Node) -> bool {
    let mut cursor = body.walk();
    let statements: Vec<Node> = body
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();
    statements.len() == 1 && statements[0].kind() == "try_statement"
}

/// An entry-point body that needs a guard, as line rows.
struct GuardTarget {
    entry: EntryPoint,
    first_row: usize,
    last_row: usize,
}

fn guard_targets(tree: &Tree, src: &str) -> Vec<GuardTarget> {
    let root = tree.root_node();
    let mut cursor = root.walk();
    let children: Vec<Node> = root.named_children(&mut cursor).collect();

    children
        .into_iter()
        .filter_map(|child| match child.kind() {
            "function_definition" => Some(child),
            "decorated_definition" => child.child_by_field_name("definition"),
            _ => None,
        })
        .filter_map(|func| {
            let name = node_text(func.child_by_field_name("name")?, src);
            let entry = EntryPoint::ALL.into_iter().find(|e| e.name() == name)?;
            let body = func.child_by_field_name("body")?;
            let header_row = func.start_position().row;
            let first_row = body.start_position().row;
            if first_row == header_row || already_guarded(body) {
                return None;
            }
            if !has_unguarded_risky_call(body, src) {
                return None;
            }
            let end = body.end_position();
            let last_row = if end.column == 0 && end.row > first_row {
                end.row - 1
            } else {
                end.row
            };
            Some(GuardTarget {
                entry,
                first_row,
                last_row,
            })
        })
        .collect()
}

fn wrap_body(lines: &mut Vec<String>, in_string: &[bool], target: &GuardTarget) {
    let indent: String = lines[target.first_row]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();

    let mut block = vec![format!("{}try:", indent)];
    for row in target.first_row..=target.last_row {
        let line = &lines[row];
        if line.trim().is_empty() || in_string.get(row).copied().unwrap_or(false) {
            block.push(line.clone());
        } else {
            block.push(format!("    {}", line));
        }
    }
    block.push(format!("{}except Exception as exc:", indent));
    block.push(format!("{}    return {}", indent, target.entry.fallback_value()));

    lines.splice(target.first_row..=target.last_row, block);
}

impl HealStage for StructuralRepair {
    fn name(&self) -> StageName {
        StageName::StructuralRepair
    }

    fn apply(&self, text: &str) -> Result<StageOutput, StageFailure> {
        let mut notes = Vec::new();
        let mut current = text.to_string();
        let mut tree = parse(&current)?;

        if let Some(defect) = SyntaxDefect::from_tree(&tree) {
            let Some((patched, note)) = bounded_patch(&current, &defect) else {
                return Err(failure(format!(
                    "{}; no bounded patch applies",
                    defect.describe()
                )));
            };
            let reparsed = parse(&patched)?;
            if let Some(remaining) = SyntaxDefect::from_tree(&reparsed) {
                return Err(failure(format!(
                    "{}; still unparsable after patch ({})",
                    remaining.describe(),
                    note
                )));
            }
            notes.push(note);
            current = patched;
            tree = reparsed;
        }

        let mut targets = guard_targets(&tree, &current);
        if targets.is_empty() {
            return Ok(StageOutput::new(current).with_notes(notes));
        }

        let in_string: Vec<bool> = lexer::line_info(&current)
            .iter()
            .map(|info| info.starts_in_string)
            .collect();
        let mut lines: Vec<String> = current.split('\n').map(String::from).collect();
        targets.sort_by_key(|t| std::cmp::Reverse(t.first_row));
        for target in &targets {
            wrap_body(&mut lines, &in_string, target);
            notes.push(format!(
                "guarded `{}` body against exceptions from risky calls",
                target.entry
            ));
        }
        let guarded = lines.join("\n");

        if let Some(defect) = SyntaxDefect::from_tree(&parse(&guarded)?) {
            return Err(failure(format!(
                "{} after synthesizing guard",
                defect.describe()
            )));
        }

        Ok(StageOutput::new(guarded).with_notes(notes))
    }
}
