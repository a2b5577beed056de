//! A small Python-aware scanner.
//!
//! Splits artifact text into code, comment, and string-literal segments so
//! that healing stages can rewrite code without touching natural-language
//! text inside strings. Joining the segments always reproduces the input.
//!
//! The scanner understands string prefixes (`r`, `b`, `f`, `u` and their
//! two-letter combinations), triple quotes, backslash escapes, and the
//! typographic quote pairs that generative services emit in place of ASCII
//! quotes (`“…”`, `‘…’`, `＂…＂`, `＇…＇`).

use std::ops::Range;

/// Delimiter style of a string literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Single,
    Double,
    TripleSingle,
    TripleDouble,
    /// A typographic or full-width quote pair; never valid Python.
    Smart { open: char, close: char },
}

impl QuoteStyle {
    fn open_len(&self) -> usize {
        match self {
            QuoteStyle::Single | QuoteStyle::Double => 1,
            QuoteStyle::TripleSingle | QuoteStyle::TripleDouble => 3,
            QuoteStyle::Smart { open, .. } => open.len_utf8(),
        }
    }

    fn close_len(&self) -> usize {
        match self {
            QuoteStyle::Single | QuoteStyle::Double => 1,
            QuoteStyle::TripleSingle | QuoteStyle::TripleDouble => 3,
            QuoteStyle::Smart { close, .. } => close.len_utf8(),
        }
    }
}

/// Metadata for a string-literal segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrInfo {
    /// Byte length of the prefix letters (`rb`, `f`, ...).
    pub prefix_len: usize,
    pub quote: QuoteStyle,
    pub raw: bool,
    pub fstring: bool,
    /// False when the literal runs into a newline (or EOF) without closing.
    pub terminated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    /// From `#` up to (not including) the newline.
    Comment,
    Str(StrInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

impl Segment {
    /// Byte range of a string literal's body within `text`.
    ///
    /// For code and comments this is the whole text.
    pub fn body_range(&self) -> Range<usize> {
        match self.kind {
            SegmentKind::Str(info) => {
                let start = info.prefix_len + info.quote.open_len();
                let end = if info.terminated {
                    self.text.len() - info.quote.close_len()
                } else {
                    self.text.len()
                };
                start..end.max(start)
            }
            _ => 0..self.text.len(),
        }
    }

    pub fn body(&self) -> &str {
        &self.text[self.body_range()]
    }

    pub fn is_code(&self) -> bool {
        self.kind == SegmentKind::Code
    }
}

/// Per-line facts derived from segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineInfo {
    /// The line begins inside a multi-line string literal.
    pub starts_in_string: bool,
    /// The line continues the previous logical line (open bracket or `\`).
    pub continuation: bool,
}

impl LineInfo {
    /// True when the line starts a new logical line of code.
    pub fn is_logical_start(&self) -> bool {
        !self.starts_in_string && !self.continuation
    }
}

/// Split `src` into segments.
pub fn segments(src: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut code_start = 0;
    let mut pos = 0;

    while let Some(ch) = src[pos..].chars().next() {
        match ch {
            '#' => {
                push_code(&mut out, &src[code_start..pos]);
                let end = src[pos..].find('\n').map_or(src.len(), |i| pos + i);
                out.push(Segment {
                    kind: SegmentKind::Comment,
                    text: src[pos..end].to_string(),
                });
                code_start = end;
                pos = end;
            }
            '\'' | '"' => {
                let prefix_start = prefix_start(src, code_start, pos);
                push_code(&mut out, &src[code_start..prefix_start]);
                let (info, end) = scan_ascii_string(src, prefix_start, pos, ch);
                out.push(Segment {
                    kind: SegmentKind::Str(info),
                    text: src[prefix_start..end].to_string(),
                });
                code_start = end;
                pos = end;
            }
            _ => {
                if let Some(close) = smart_close(ch) {
                    push_code(&mut out, &src[code_start..pos]);
                    let (info, end) = scan_smart_string(src, pos, ch, close);
                    out.push(Segment {
                        kind: SegmentKind::Str(info),
                        text: src[pos..end].to_string(),
                    });
                    code_start = end;
                    pos = end;
                } else {
                    pos += ch.len_utf8();
                }
            }
        }
    }

    push_code(&mut out, &src[code_start..]);
    out
}

/// Concatenate segments back into text.
pub fn join(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// Apply `f` to every code segment, leaving strings and comments untouched.
pub fn map_code<F>(src: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    segments(src)
        .into_iter()
        .map(|seg| if seg.is_code() { f(&seg.text) } else { seg.text })
        .collect()
}

/// Compute `LineInfo` for every line of `src` (split on `\n`).
pub fn line_info(src: &str) -> Vec<LineInfo> {
    let mut infos = vec![LineInfo::default()];
    let mut depth: usize = 0;
    let mut prev_backslash = false;

    for seg in segments(src) {
        match seg.kind {
            SegmentKind::Code => {
                for ch in seg.text.chars() {
                    match ch {
                        '(' | '[' | '{' => depth += 1,
                        ')' | ']' | '}' => depth = depth.saturating_sub(1),
                        '\n' => infos.push(LineInfo {
                            starts_in_string: false,
                            continuation: depth > 0 || prev_backslash,
                        }),
                        _ => {}
                    }
                    prev_backslash = ch == '\\';
                }
            }
            SegmentKind::Comment => prev_backslash = false,
            SegmentKind::Str(_) => {
                for ch in seg.text.chars() {
                    if ch == '\n' {
                        infos.push(LineInfo {
                            starts_in_string: true,
                            continuation: true,
                        });
                    }
                }
                prev_backslash = false;
            }
        }
    }

    infos
}

/// The code portion of a single line, with any trailing comment removed.
pub fn code_of_line(line: &str) -> String {
    segments(line)
        .into_iter()
        .filter(|seg| seg.kind != SegmentKind::Comment)
        .map(|seg| seg.text)
        .collect()
}

/// Code with every string literal collapsed to `""` and comments dropped.
///
/// Useful for pattern searches that must not see natural-language text.
pub fn code_skeleton(src: &str) -> String {
    segments(src)
        .into_iter()
        .filter_map(|seg| match seg.kind {
            SegmentKind::Code => Some(seg.text),
            SegmentKind::Str(_) => Some("\"\"".to_string()),
            SegmentKind::Comment => None,
        })
        .collect()
}

/// Byte ranges of the replacement fields (`{...}`) inside an f-string body.
///
/// Doubled braces are literal text and are skipped.
pub fn fstring_fields(body: &str) -> Vec<Range<usize>> {
    let bytes = body.as_bytes();
    let mut fields = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => i += 2,
            b'}' if bytes.get(i + 1) == Some(&b'}') => i += 2,
            b'{' => {
                let start = i + 1;
                let mut depth = 1;
                let mut j = start;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth == 0 {
                    fields.push(start..j - 1);
                }
                i = j;
            }
            _ => i += 1,
        }
    }

    fields
}

/// Leading whitespace width, counting a tab as four columns.
pub fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// True for lines that are empty or hold only a comment.
pub fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// One logical statement (possibly spanning several physical lines).
#[derive(Debug, Clone)]
pub struct Statement {
    /// First physical line (0-based).
    pub start: usize,
    /// Last physical line, inclusive.
    pub end: usize,
    pub indent: usize,
    /// Code of the first line, trimmed, without any comment.
    pub code: String,
    /// The last line ends with `:`.
    pub opens_block: bool,
}

/// Logical statements of `lines`, skipping blank and comment-only lines.
pub fn statements(lines: &[String]) -> Vec<Statement> {
    let text = lines.join("\n");
    let infos = line_info(&text);
    let mut out: Vec<Statement> = Vec::new();

    for (i, (line, info)) in lines.iter().zip(infos).enumerate() {
        if info.is_logical_start() {
            if is_blank_or_comment(line) {
                continue;
            }
            out.push(Statement {
                start: i,
                end: i,
                indent: indent_width(line),
                code: code_of_line(line).trim().to_string(),
                opens_block: false,
            });
        } else if let Some(last) = out.last_mut() {
            last.end = i;
        }
    }

    for stmt in &mut out {
        stmt.opens_block = code_of_line(&lines[stmt.end])
            .trim_end()
            .ends_with(':');
    }
    out
}

/// Index one past the last statement of the block opened by `stmts[at]`.
pub fn block_end(stmts: &[Statement], at: usize) -> usize {
    let indent = stmts[at].indent;
    stmts[at + 1..]
        .iter()
        .position(|s| s.indent <= indent)
        .map_or(stmts.len(), |offset| at + 1 + offset)
}

fn push_code(out: &mut Vec<Segment>, text: &str) {
    if !text.is_empty() {
        out.push(Segment {
            kind: SegmentKind::Code,
            text: text.to_string(),
        });
    }
}

/// Find where a string prefix (if any) begins before the quote at `quote_pos`.
fn prefix_start(src: &str, floor: usize, quote_pos: usize) -> usize {
    let before = &src[floor..quote_pos];
    let letters = before
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if letters == 0 || letters > 2 {
        return quote_pos;
    }

    let start = quote_pos - letters;
    let prefix = src[start..quote_pos].to_ascii_lowercase();
    let valid = matches!(
        prefix.as_str(),
        "r" | "u" | "f" | "b" | "rb" | "br" | "fr" | "rf"
    );
    let preceded_by_ident = src[floor..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_alphanumeric() || c == '_');

    if valid && !preceded_by_ident {
        start
    } else {
        quote_pos
    }
}

fn scan_ascii_string(src: &str, prefix_start: usize, quote_pos: usize, quote: char) -> (StrInfo, usize) {
    let prefix = src[prefix_start..quote_pos].to_ascii_lowercase();
    let triple_marker: String = std::iter::repeat_n(quote, 3).collect();
    let triple = src[quote_pos..].starts_with(&triple_marker);
    let style = match (quote, triple) {
        ('\'', false) => QuoteStyle::Single,
        ('\'', true) => QuoteStyle::TripleSingle,
        (_, false) => QuoteStyle::Double,
        (_, true) => QuoteStyle::TripleDouble,
    };

    let mut pos = quote_pos + style.open_len();
    let mut terminated = false;
    while let Some(ch) = src[pos..].chars().next() {
        if ch == '\\' {
            pos += 1;
            if let Some(next) = src[pos..].chars().next() {
                pos += next.len_utf8();
            }
            continue;
        }
        if triple {
            if src[pos..].starts_with(&triple_marker) {
                pos += 3;
                terminated = true;
                break;
            }
        } else if ch == quote {
            pos += 1;
            terminated = true;
            break;
        } else if ch == '\n' {
            break;
        }
        pos += ch.len_utf8();
    }

    let info = StrInfo {
        prefix_len: quote_pos - prefix_start,
        quote: style,
        raw: prefix.contains('r'),
        fstring: prefix.contains('f'),
        terminated,
    };
    (info, pos)
}

fn scan_smart_string(src: &str, open_pos: usize, open: char, close: char) -> (StrInfo, usize) {
    let mut pos = open_pos + open.len_utf8();
    let mut terminated = false;
    while let Some(ch) = src[pos..].chars().next() {
        if ch == close {
            pos += ch.len_utf8();
            terminated = true;
            break;
        }
        if ch == '\n' {
            break;
        }
        pos += ch.len_utf8();
    }

    let info = StrInfo {
        prefix_len: 0,
        quote: QuoteStyle::Smart { open, close },
        raw: false,
        fstring: false,
        terminated,
    };
    (info, pos)
}

fn smart_close(open: char) -> Option<char> {
    match open {
        '\u{201C}' => Some('\u{201D}'),
        '\u{2018}' => Some('\u{2019}'),
        '\u{FF02}' => Some('\u{FF02}'),
        '\u{FF07}' => Some('\u{FF07}'),
        _ => None,
    }
}
