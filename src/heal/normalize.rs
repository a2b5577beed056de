//! Stage 2: fold full-width and typographic characters in code.

use super::lexer::{self, QuoteStyle, SegmentKind};
use super::stage::{HealStage, StageFailure, StageName, StageOutput};

/// Converts full-width punctuation and space variants to half-width
/// outside of string literals and comments.
///
/// Typographic quote pairs (`“…”`, `‘…’`, full-width `＂…＂`) delimit a
/// literal in generated code; the delimiters become ASCII quotes and the
/// literal's text is kept as written.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharacterNormalizer;

/// Map a single code character to its half-width equivalent.
pub fn fold_char(ch: char) -> Option<char> {
    match ch {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(ch as u32 - 0xFEE0),
        '\u{3000}' | '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' => Some(' '),
        '\u{3001}' => Some(','),
        '\u{3002}' => Some('.'),
        '\u{2010}'..='\u{2015}' | '\u{2212}' => Some('-'),
        '\u{00D7}' => Some('*'),
        '\u{00F7}' => Some('/'),
        _ => None,
    }
}

fn requote(body: &str) -> String {
    if !body.contains('"') {
        format!("\"{}\"", body)
    } else if !body.contains('\'') {
        format!("'{}'", body)
    } else {
        format!("\"{}\"", body.replace('"', "\\\""))
    }
}

impl HealStage for CharacterNormalizer {
    fn name(&self) -> StageName {
        StageName::CharacterNormalizer
    }

    fn apply(&self, text: &str) -> Result<StageOutput, StageFailure> {
        let mut folded = 0usize;
        let mut requoted = 0usize;
        let mut out = String::with_capacity(text.len());

        for seg in lexer::segments(text) {
            match seg.kind {
                SegmentKind::Code => {
                    for ch in seg.text.chars() {
                        match fold_char(ch) {
                            Some(half) => {
                                folded += 1;
                                out.push(half);
                            }
                            None => out.push(ch),
                        }
                    }
                }
                SegmentKind::Str(info) if matches!(info.quote, QuoteStyle::Smart { .. }) => {
                    requoted += 1;
                    out.push_str(&requote(seg.body()));
                }
                _ => out.push_str(&seg.text),
            }
        }

        let mut notes = Vec::new();
        if folded > 0 {
            notes.push(format!("folded {} full-width character(s)", folded));
        }
        if requoted > 0 {
            notes.push(format!("replaced typographic quotes on {} literal(s)", requoted));
        }
        Ok(StageOutput::new(out).with_notes(notes))
    }
}
