//! Stage 4: ensure both entry points exist with the required names.

use regex::Regex;
use std::sync::LazyLock;

use super::lexer::{self, Statement, block_end, statements};
use super::stage::{HealStage, StageFailure, StageName, StageOutput};
use crate::contract::EntryPoint;

static BARE_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)([A-Za-z_][A-Za-z0-9_]*)\s*\(([^()]*)\)\s*:\s*$")
        .expect("Invalid bare header regex")
});

static DEF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("Invalid def regex")
});

static PARAMS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^def\s+(generate|check)\s*\(([^()]*)\)").expect("Invalid params regex")
});

const KEYWORDS: &[&str] = &[
    "if", "elif", "while", "for", "with", "return", "print", "assert", "del", "not", "and", "or",
    "in", "is", "lambda", "yield", "except", "raise", "await", "match", "case", "def", "class",
];

/// Verifies `generate` and `check` are defined at top level.
///
/// Repairs, in order: headers written without `def`, known alias names,
/// function bodies whose header is missing, and wrong arity. Fails when an
/// entry point is still missing afterwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureWrapper;

fn top_level_defs(stmts: &[Statement]) -> Vec<(usize, String)> {
    stmts
        .iter()
        .enumerate()
        .filter(|(_, s)| s.indent == 0)
        .filter_map(|(i, s)| {
            DEF_REGEX
                .captures(&s.code)
                .map(|caps| (i, caps[1].to_string()))
        })
        .collect()
}

fn defines(stmts: &[Statement], entry: EntryPoint) -> bool {
    top_level_defs(stmts)
        .iter()
        .any(|(_, name)| name == entry.name())
}

fn add_missing_def_keywords(lines: &mut [String]) -> Vec<String> {
    let mut notes = Vec::new();
    for stmt in statements(lines) {
        if stmt.start != stmt.end {
            continue;
        }
        let line = &lines[stmt.start];
        let code = lexer::code_of_line(line);
        let Some(caps) = BARE_HEADER_REGEX.captures(code.trim_end()) else {
            continue;
        };
        let name = &caps[2];
        if KEYWORDS.contains(&name) {
            continue;
        }
        let indent = caps[1].to_string();
        notes.push(format!("added missing `def` to header `{}`", name));
        lines[stmt.start] = format!("{}def {}", indent, &line[indent.len()..]);
    }
    notes
}

fn rename_aliases(lines: &mut Vec<String>) -> Vec<String> {
    let mut notes = Vec::new();

    for entry in EntryPoint::ALL {
        let stmts = statements(lines);
        if defines(&stmts, entry) {
            continue;
        }
        let Some((index, alias)) = top_level_defs(&stmts)
            .into_iter()
            .find(|(_, name)| entry.aliases().contains(&name.as_str()))
        else {
            continue;
        };

        let start = stmts[index].start;
        lines[start] = lines[start].replacen(&alias, entry.name(), 1);
        let end = block_end(&stmts, index);
        let insert_at = stmts[end - 1].end + 1;
        lines.insert(insert_at, format!("{} = {}", alias, entry.name()));
        notes.push(format!(
            "renamed `{}` to `{}` and kept the old name as an alias",
            alias, entry
        ));
    }
    notes
}

/// A run of statements that looks like a function body with no header.
struct Orphan {
    first: usize,
    last: usize,
}

fn orphan_blocks(stmts: &[Statement], lines: &[String]) -> Vec<Orphan> {
    let mut orphans = Vec::new();

    // Indented code that nothing opened.
    let mut k = 0;
    while k < stmts.len() {
        let stmt = &stmts[k];
        let unopened = k == 0
            || (stmts[k - 1].indent < stmt.indent && !stmts[k - 1].opens_block);
        if stmt.indent > 0 && unopened {
            let last = stmts[k + 1..]
                .iter()
                .position(|s| s.indent < stmt.indent)
                .map_or(stmts.len() - 1, |offset| k + offset);
            orphans.push(Orphan { first: k, last });
            k = last + 1;
        } else {
            k += 1;
        }
    }

    // Code following a body-level `return` and a blank line.
    for (def_index, _) in top_level_defs(stmts) {
        if !stmts[def_index].opens_block {
            continue;
        }
        let end = block_end(stmts, def_index);
        if end <= def_index + 1 {
            continue;
        }
        let body_indent = stmts[def_index + 1].indent;
        for r in def_index + 1..end.saturating_sub(1) {
            let ret = &stmts[r];
            let next = &stmts[r + 1];
            let is_return = ret.code == "return"
                || ret.code.starts_with("return ")
                || ret.code.starts_with("return(");
            let separated = lines[ret.end + 1..next.start]
                .iter()
                .any(|l| l.trim().is_empty());
            if ret.indent == body_indent && is_return && next.indent == body_indent && separated {
                orphans.push(Orphan {
                    first: r + 1,
                    last: end - 1,
                });
                break;
            }
        }
    }

    orphans
}

fn score(entry: EntryPoint, body: &str) -> usize {
    let hits = |needles: &[&str]| -> usize { needles.iter().map(|n| body.matches(n).count()).sum() };
    match entry {
        EntryPoint::Check => {
            3 * hits(&["user_answer"]) + hits(&["\"correct\"", "'correct'", "item["])
        }
        EntryPoint::Generate => {
            hits(&["\"question\"", "'question'", "random."])
                + hits(&["\"answer\":", "'answer':"])
        }
    }
}

fn wrap_orphans(lines: &mut Vec<String>) -> Vec<String> {
    let stmts = statements(lines);
    let mut missing: Vec<EntryPoint> = EntryPoint::ALL
        .into_iter()
        .filter(|entry| !defines(&stmts, *entry))
        .collect();
    if missing.is_empty() {
        return Vec::new();
    }

    let mut inserts: Vec<(usize, EntryPoint)> = Vec::new();
    for orphan in orphan_blocks(&stmts, lines) {
        let start = stmts[orphan.first].start;
        let body = lines[start..=stmts[orphan.last].end].join("\n");
        let best = missing
            .iter()
            .map(|entry| (*entry, score(*entry, &body)))
            .filter(|(_, s)| *s > 0)
            .max_by_key(|(_, s)| *s);
        if let Some((entry, _)) = best {
            missing.retain(|m| *m != entry);
            inserts.push((start, entry));
        }
    }

    inserts.sort_by_key(|(start, _)| std::cmp::Reverse(*start));
    let mut notes = Vec::new();
    for (start, entry) in inserts {
        lines.insert(start, entry.header().to_string());
        notes.push(format!(
            "synthesized `{}` around an orphaned body at line {}",
            entry.header(),
            start + 1
        ));
    }
    notes
}

fn fix_arity(lines: &mut [String]) -> Vec<String> {
    let mut notes = Vec::new();

    for stmt in statements(lines) {
        if stmt.indent != 0 || stmt.start != stmt.end {
            continue;
        }
        let line = lines[stmt.start].clone();
        let Some(caps) = PARAMS_REGEX.captures(&line) else {
            continue;
        };
        let Some(entry) = EntryPoint::resolve(&caps[1]) else {
            continue;
        };
        let params_match = caps.get(2).map_or(0..0, |m| m.range());
        let params: Vec<String> = caps[2]
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let Some(fixed) = adjust_params(entry, &params) else {
            continue;
        };
        notes.push(format!(
            "adjusted `{}` parameters from ({}) to ({})",
            entry,
            params.join(", "),
            fixed
        ));
        lines[stmt.start] = format!(
            "{}{}{}",
            &line[..params_match.start],
            fixed,
            &line[params_match.end..]
        );
    }
    notes
}

fn adjust_params(entry: EntryPoint, params: &[String]) -> Option<String> {
    let is_required = |p: &String| !p.contains('=') && !p.starts_with('*');
    let variadic = params.iter().any(|p| p.starts_with('*'));

    let fixed: Vec<String> = match entry {
        EntryPoint::Generate => params
            .iter()
            .map(|p| if is_required(p) { format!("{}=None", p) } else { p.clone() })
            .collect(),
        EntryPoint::Check => {
            let positional = params.iter().filter(|p| !p.starts_with('*')).count();
            let mut fixed: Vec<String> = Vec::new();
            let mut required_seen = 0;
            for p in params {
                if is_required(p) {
                    required_seen += 1;
                    if required_seen > 2 {
                        fixed.push(format!("{}=None", p));
                        continue;
                    }
                }
                fixed.push(p.clone());
            }
            match (positional, variadic) {
                (0, false) => vec!["user_answer".to_string(), "item=None".to_string()],
                (1, false) => {
                    fixed.insert(1, "item=None".to_string());
                    fixed
                }
                _ => fixed,
            }
        }
    };

    (fixed.as_slice() != params).then(|| fixed.join(", "))
}

impl HealStage for SignatureWrapper {
    fn name(&self) -> StageName {
        StageName::SignatureWrapper
    }

    fn apply(&self, text: &str) -> Result<StageOutput, StageFailure> {
        let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
        let mut notes = add_missing_def_keywords(&mut lines);
        notes.extend(rename_aliases(&mut lines));
        notes.extend(wrap_orphans(&mut lines));
        notes.extend(fix_arity(&mut lines));

        let stmts = statements(&lines);
        let missing: Vec<&str> = EntryPoint::ALL
            .into_iter()
            .filter(|entry| !defines(&stmts, *entry))
            .map(|entry| entry.name())
            .collect();
        if !missing.is_empty() {
            return Err(StageFailure::new(
                StageName::SignatureWrapper,
                format!(
                    "missing required entry point(s) `{}` with no recognizable body to wrap",
                    missing.join("`, `")
                ),
            ));
        }

        Ok(StageOutput::new(lines.join("\n")).with_notes(notes))
    }
}
