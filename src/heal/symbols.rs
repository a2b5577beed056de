//! Stage 6: remove definitions and bindings that shadow builtins.

use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;

use super::lexer::{self, SegmentKind, block_end, statements};
use super::stage::{HealStage, StageFailure, StageName, StageOutput};

/// Builtins that generated modules must not redefine.
pub const FORBIDDEN_NAMES: &[&str] = &[
    "print", "input", "len", "range", "list", "dict", "str", "int", "float", "sum", "min", "max",
    "abs", "round", "sorted", "set", "tuple", "bool", "type", "open", "eval", "exec",
];

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";

static IDENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IDENT).expect("Invalid identifier regex"));

static DEF_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^def\s+({})\s*\(", IDENT)).expect("Invalid def name regex")
});

// a = ..., a, b = ..., a += ...; only valid at the start of a logical line.
static ASSIGNMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let names = format!(r"{0}(?:\s*,\s*{0})*", IDENT);
    Regex::new(&format!(r"^\s*\(?({})\)?\s*(?:[-+*/%]|//|\*\*)?=[^=]", names))
        .expect("Invalid assignment regex")
});

static DEF_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\bdef\s+{}\s*$", IDENT)).expect("Invalid def header regex")
});

static BINDING_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let names = format!(r"{0}(?:\s*,\s*{0})*", IDENT);
    [
        format!(r"\bfor\s+\(?({})\)?\s+in\b", names),
        format!(r"\bas\s+({})", IDENT),
        format!(r"({})\s*:=", IDENT),
        format!(r"(?m)^\s*def\s+{}\s*\(([^()]*)\)", IDENT),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid binding regex"))
    .collect()
});

/// Deletes function definitions named after builtins and renames
/// variables and parameters that shadow them to `<name>_value`.
///
/// Call sites (`name(...)`) and attribute accesses (`obj.name`) keep the
/// original name so they reach the builtin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForbiddenSymbolRemover;

fn delete_shadowing_defs(lines: &mut Vec<String>) -> Vec<String> {
    let mut notes = Vec::new();

    loop {
        let stmts = statements(lines);
        let found = stmts.iter().enumerate().find_map(|(i, s)| {
            let caps = DEF_NAME_REGEX.captures(&s.code)?;
            FORBIDDEN_NAMES
                .contains(&&caps[1])
                .then(|| (i, caps[1].to_string()))
        });
        let Some((index, name)) = found else {
            break;
        };

        let def = &stmts[index];
        let mut first = index;
        while first > 0
            && stmts[first - 1].indent == def.indent
            && stmts[first - 1].code.starts_with('@')
        {
            first -= 1;
        }
        let end = block_end(&stmts, index);
        let start_line = stmts[first].start;
        let end_line = stmts[end - 1].end;

        // Keep the enclosing block non-empty.
        let parent_opens = first > 0
            && stmts[first - 1].indent < def.indent
            && stmts[first - 1].opens_block;
        let next_shallower = stmts.get(end).is_none_or(|s| s.indent < def.indent);
        let replacement: Vec<String> = if def.indent > 0 && parent_opens && next_shallower {
            let indent: String = lines[def.start]
                .chars()
                .take_while(|c| c.is_whitespace())
                .collect();
            vec![format!("{}pass", indent)]
        } else {
            Vec::new()
        };

        lines.splice(start_line..=end_line, replacement);
        notes.push(format!("deleted definition `{}` shadowing the builtin", name));
    }
    notes
}

fn bound_forbidden_names(text: &str) -> BTreeSet<&'static str> {
    let skeleton = lexer::code_skeleton(text);
    let mut bound = BTreeSet::new();
    let mut collect = |names: &str| {
        for part in names.split(',') {
            let name = part
                .trim()
                .trim_start_matches('*')
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .next()
                .unwrap_or("");
            if let Some(forbidden) = FORBIDDEN_NAMES.iter().find(|f| **f == name) {
                bound.insert(*forbidden);
            }
        }
    };

    // Continuation lines inside brackets hold keyword arguments, not bindings.
    for (line, info) in text.split('\n').zip(lexer::line_info(text)) {
        if !info.is_logical_start() {
            continue;
        }
        if let Some(caps) = ASSIGNMENT_REGEX.captures(&lexer::code_skeleton(line)) {
            collect(&caps[1]);
        }
    }

    for regex in BINDING_REGEXES.iter() {
        for caps in regex.captures_iter(&skeleton) {
            collect(&caps[1]);
        }
    }
    bound
}

fn fresh_name(text: &str, name: &str) -> String {
    let skeleton = lexer::code_skeleton(text);
    let taken = |candidate: &str| {
        IDENT_REGEX
            .find_iter(&skeleton)
            .any(|m| m.as_str() == candidate)
    };
    let mut candidate = format!("{}_value", name);
    let mut n = 2;
    while taken(&candidate) {
        candidate = format!("{}_value{}", name, n);
        n += 1;
    }
    candidate
}

/// Push or pop open brackets seen in `code[range]`. Each entry is true for
/// the parentheses of a call, where `name=` is a keyword argument.
fn track_brackets(code: &str, range: Range<usize>, brackets: &mut Vec<bool>) {
    let offset = range.start;
    for (i, ch) in code[range].char_indices() {
        match ch {
            '(' => {
                let before = code[..offset + i].trim_end();
                let callee = before
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == ')' || c == ']');
                brackets.push(callee && !DEF_HEADER_REGEX.is_match(before));
            }
            '[' | '{' => brackets.push(false),
            ')' | ']' | '}' => {
                brackets.pop();
            }
            _ => {}
        }
    }
}

fn rename_in_code(code: &str, name: &str, new: &str, brackets: &mut Vec<bool>) -> (String, usize) {
    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    let mut scanned = 0;
    let mut count = 0;

    for m in IDENT_REGEX.find_iter(code) {
        track_brackets(code, scanned..m.start(), brackets);
        scanned = m.start();
        if m.as_str() != name {
            continue;
        }
        let before = &code[..m.start()];
        let after = code[m.end()..].trim_start();
        let attribute = before.trim_end().ends_with('.');
        let glued = before.chars().next_back().is_some_and(|c| c.is_ascii_digit());
        let call = after.starts_with('(');
        let keyword = brackets.last() == Some(&true)
            && after.starts_with('=')
            && !after.starts_with("==");
        if attribute || glued || call || keyword {
            continue;
        }
        out.push_str(&code[last..m.start()]);
        out.push_str(new);
        last = m.end();
        count += 1;
    }
    track_brackets(code, scanned..code.len(), brackets);
    out.push_str(&code[last..]);
    (out, count)
}

/// Rename `name` to `new` in code and in f-string replacement fields.
pub fn rename_identifier(text: &str, name: &str, new: &str) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut count = 0;
    let mut brackets = Vec::new();

    for seg in lexer::segments(text) {
        match seg.kind {
            SegmentKind::Code => {
                let (renamed, n) = rename_in_code(&seg.text, name, new, &mut brackets);
                out.push_str(&renamed);
                count += n;
            }
            SegmentKind::Str(info) if info.fstring => {
                let range = seg.body_range();
                let body = &seg.text[range.clone()];
                let mut rebuilt = String::with_capacity(body.len());
                let mut last = 0;
                for field in lexer::fstring_fields(body) {
                    let (renamed, n) = rename_identifier(&body[field.clone()], name, new);
                    rebuilt.push_str(&body[last..field.start]);
                    rebuilt.push_str(&renamed);
                    last = field.end;
                    count += n;
                }
                rebuilt.push_str(&body[last..]);
                out.push_str(&seg.text[..range.start]);
                out.push_str(&rebuilt);
                out.push_str(&seg.text[range.end..]);
            }
            _ => out.push_str(&seg.text),
        }
    }
    (out, count)
}

impl HealStage for ForbiddenSymbolRemover {
    fn name(&self) -> StageName {
        StageName::ForbiddenSymbolRemover
    }

    fn apply(&self, text: &str) -> Result<StageOutput, StageFailure> {
        let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
        let mut notes = delete_shadowing_defs(&mut lines);
        let mut current = lines.join("\n");

        for name in bound_forbidden_names(&current) {
            let new = fresh_name(&current, name);
            let (renamed, sites) = rename_identifier(&current, name, &new);
            if sites > 0 {
                notes.push(format!(
                    "renamed binding `{}` to `{}` at {} site(s)",
                    name, new, sites
                ));
                current = renamed;
            }
        }

        Ok(StageOutput::new(current).with_notes(notes))
    }
}
