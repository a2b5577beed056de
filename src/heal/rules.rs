//! The Pattern Rule Table and stage 5, the pattern rewriter.
//!
//! Each rule encodes one previously observed generation defect as a
//! (matcher, replacement, rationale) entry. Rules are scoped so that a rule
//! meant for string bodies never touches code and vice versa.

use regex::{Captures, Regex};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::lexer::{self, QuoteStyle, SegmentKind};
use super::stage::{HealStage, StageFailure, StageName, StageOutput};

/// Which part of the artifact a rule may rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleScope {
    /// Code outside strings and comments.
    Code,
    /// Bodies of non-raw string literals (f-strings included).
    StringBody,
    /// Bodies of f-string literals, raw or not.
    FStringBody,
    /// Whole physical lines that begin a logical line of code.
    Line,
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleScope::Code => "code",
            RuleScope::StringBody => "string-body",
            RuleScope::FStringBody => "fstring-body",
            RuleScope::Line => "line",
        };
        f.write_str(name)
    }
}

/// How a match is rewritten.
#[derive(Clone, Copy)]
pub enum Replacement {
    /// A `regex` replacement template (`$1`, `${name}`).
    Template(&'static str),
    Computed(fn(&Captures) -> String),
}

/// Static definition of one rule.
pub struct RuleSpec {
    pub id: &'static str,
    pub scope: RuleScope,
    pub pattern: &'static str,
    pub replacement: Replacement,
    pub rationale: &'static str,
}

fn triple_brace_fields(caps: &Captures) -> String {
    let fields = caps[2]
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split("}{")
        .map(|name| format!("{{{{{{{}}}}}}}", name))
        .collect::<String>();
    format!("{}{}", &caps[1], fields)
}

fn brace_superscript(caps: &Captures) -> String {
    let inner = &caps[1];
    if inner.chars().all(|c| c.is_ascii_digit()) {
        format!("^{{{{{}}}}}", inner)
    } else {
        format!("^{{{{{{{}}}}}}}", inner)
    }
}

fn expand_leading_tabs(caps: &Captures) -> String {
    caps[1].replace('\t', "    ")
}

/// The ordered rule table.
pub static RULE_SPECS: &[RuleSpec] = &[
    RuleSpec {
        id: "fstring-latex-command-brace",
        scope: RuleScope::FStringBody,
        pattern: r"(\\{1,2}[A-Za-z]+)((?:\{[A-Za-z_][A-Za-z0-9_]*\})+)",
        replacement: Replacement::Computed(triple_brace_fields),
        rationale: "a LaTeX command followed by `{name}` in an f-string interpolates \
                    the value and loses the grouping braces; the group must be `{{{name}}}`",
    },
    RuleSpec {
        id: "fstring-latex-superscript-brace",
        scope: RuleScope::FStringBody,
        pattern: r"\^\{([A-Za-z_][A-Za-z0-9_]*|[0-9]+)\}",
        replacement: Replacement::Computed(brace_superscript),
        rationale: "`^{n}` in an f-string is an interpolation, so multi-digit exponents \
                    render without their LaTeX group",
    },
    RuleSpec {
        id: "latex-backslash-escape",
        scope: RuleScope::StringBody,
        pattern: r"(^|[^\\])\\(frac|dfrac|tfrac|times|theta|text|tan|triangle|to|beta|bar|binom|boxed|alpha|angle|approx|vec|varphi|rightarrow|right|rho|neq|nabla|sqrt|cdot|div|pm|sin|cos|log|ln|circ|pi|leq|geq|le|ge|infty|sum|int|lim|left|mathrm|mathbf|overline|quad|degree)\b",
        replacement: Replacement::Template(r"${1}\\${2}"),
        rationale: "backslash-prefixed LaTeX commands such as `\\frac` or `\\times` in a \
                    non-raw string turn into control characters; the backslash must be doubled",
    },
    RuleSpec {
        id: "lambda-identifier",
        scope: RuleScope::Code,
        pattern: r"\blambda(\s*[=+\-/%),\]}<>])",
        replacement: Replacement::Template("lambda_${1}"),
        rationale: "`lambda` is a reserved word and cannot name a wavelength or eigenvalue variable",
    },
    RuleSpec {
        id: "print-statement",
        scope: RuleScope::Line,
        pattern: r"^(\s*)print\s+([^\s(=#][^#]*?)\s*$",
        replacement: Replacement::Template("${1}print(${2})"),
        rationale: "Python 2 print statements are a syntax error in Python 3",
    },
    RuleSpec {
        id: "tab-indentation",
        scope: RuleScope::Line,
        pattern: r"^( *\t[ \t]*)",
        replacement: Replacement::Computed(expand_leading_tabs),
        rationale: "tab indentation mixed with space indentation is ambiguous; \
                    tabs are expanded to four spaces",
    },
];

/// A compiled rule.
pub struct PatternRule {
    spec: &'static RuleSpec,
    regex: Regex,
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRule")
            .field("id", &self.spec.id)
            .field("scope", &self.spec.scope)
            .field("pattern", &self.regex.as_str())
            .finish()
    }
}

static RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    RULE_SPECS
        .iter()
        .map(|spec| PatternRule {
            spec,
            regex: Regex::new(spec.pattern).expect("Invalid pattern rule regex"),
        })
        .collect()
});

/// The compiled rule table, in application order.
pub fn rules() -> &'static [PatternRule] {
    &RULES
}

impl PatternRule {
    pub fn id(&self) -> &'static str {
        self.spec.id
    }

    pub fn scope(&self) -> RuleScope {
        self.spec.scope
    }

    pub fn rationale(&self) -> &'static str {
        self.spec.rationale
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    fn replace<'t>(&self, text: &'t str) -> (Cow<'t, str>, usize) {
        let hits = self.regex.find_iter(text).count();
        if hits == 0 {
            return (Cow::Borrowed(text), 0);
        }
        let replaced = match self.spec.replacement {
            Replacement::Template(template) => self.regex.replace_all(text, template),
            Replacement::Computed(f) => self.regex.replace_all(text, f),
        };
        (replaced, hits)
    }

    /// Apply one sweep of this rule within its scope.
    ///
    /// Returns the new text and how many matches were rewritten.
    pub fn apply(&self, text: &str) -> (String, usize) {
        match self.spec.scope {
            RuleScope::Line => self.apply_lines(text),
            scope => self.apply_segments(text, scope),
        }
    }

    fn apply_lines(&self, text: &str) -> (String, usize) {
        let infos = lexer::line_info(text);
        let mut total = 0;
        let lines: Vec<Cow<str>> = text
            .split('\n')
            .zip(infos)
            .map(|(line, info)| {
                if !info.is_logical_start() {
                    return Cow::Borrowed(line);
                }
                let (out, hits) = self.replace(line);
                total += hits;
                out
            })
            .collect();
        (lines.join("\n"), total)
    }

    fn apply_segments(&self, text: &str, scope: RuleScope) -> (String, usize) {
        let mut total = 0;
        let mut out = String::with_capacity(text.len());

        for seg in lexer::segments(text) {
            let in_scope = match (scope, seg.kind) {
                (RuleScope::Code, SegmentKind::Code) => true,
                (RuleScope::StringBody, SegmentKind::Str(info)) => {
                    !info.raw && !matches!(info.quote, QuoteStyle::Smart { .. })
                }
                (RuleScope::FStringBody, SegmentKind::Str(info)) => info.fstring,
                _ => false,
            };
            if !in_scope {
                out.push_str(&seg.text);
                continue;
            }

            let range = seg.body_range();
            let (body, hits) = self.replace(&seg.text[range.clone()]);
            total += hits;
            out.push_str(&seg.text[..range.start]);
            out.push_str(&body);
            out.push_str(&seg.text[range.end..]);
        }

        (out, total)
    }
}

/// Applies the rule table in repeated passes until nothing matches.
#[derive(Debug, Clone, Copy)]
pub struct PatternRewriter {
    max_passes: usize,
}

impl PatternRewriter {
    pub fn new(max_passes: usize) -> Self {
        Self {
            max_passes: max_passes.max(1),
        }
    }
}

impl HealStage for PatternRewriter {
    fn name(&self) -> StageName {
        StageName::PatternRewriter
    }

    fn apply(&self, text: &str) -> Result<StageOutput, StageFailure> {
        let table = rules();
        let mut current = text.to_string();
        let mut hits = vec![0usize; table.len()];
        let mut passes = 0;
        let mut converged = false;

        while passes < self.max_passes {
            passes += 1;
            let mut pass_hits = 0;
            for (i, rule) in table.iter().enumerate() {
                let (next, n) = rule.apply(&current);
                if n > 0 {
                    hits[i] += n;
                    pass_hits += n;
                    current = next;
                }
            }
            if pass_hits == 0 {
                converged = true;
                break;
            }
        }

        let mut notes: Vec<String> = table
            .iter()
            .zip(&hits)
            .filter(|(_, n)| **n > 0)
            .map(|(rule, n)| format!("rule `{}` rewrote {} match(es)", rule.id(), n))
            .collect();

        if !converged && table.iter().any(|rule| rule.apply(&current).1 > 0) {
            warn!(passes, "pattern rewriter hit its pass ceiling");
            notes.push(format!(
                "pass ceiling ({}) reached with rules still matching",
                self.max_passes
            ));
        }
        debug!(passes, rewrites = hits.iter().sum::<usize>(), "pattern rewriter finished");

        Ok(StageOutput::new(current).with_notes(notes))
    }
}
