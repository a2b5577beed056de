//! Delimiter escaping for text embedded in the instruction envelope.
//!
//! The envelope marks sections with `<tag>` delimiters. Any `<`, `>` or `&`
//! inside embedded text is replaced by an entity so example code such as
//! `if a < b:` can never open or close a section.

/// Escape `&`, `<` and `>` as `&amp;`, `&lt;` and `&gt;`.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

const ENTITIES: [(&str, char); 3] = [("&amp;", '&'), ("&lt;", '<'), ("&gt;", '>')];

/// Invert [`escape`]. Unknown entities and stray `&` pass through unchanged.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        match ENTITIES.iter().find(|(entity, _)| tail.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_escape_comparisons_and_tags() {
        assert_eq!(escape("if a < b and c > d:"), "if a &lt; b and c &gt; d:");
        assert_eq!(escape("</example>"), "&lt;/example&gt;");
        assert_eq!(escape("x & y"), "x &amp; y");
    }

    #[test]
    fn test_unescape_scans_left_to_right() {
        assert_eq!(unescape("&amp;lt;"), "&lt;");
        assert_eq!(unescape("&lt;b&gt;"), "<b>");
    }

    #[test]
    fn test_unescape_keeps_unknown_entities() {
        assert_eq!(unescape("&nbsp; & &am"), "&nbsp; & &am");
    }

    proptest! {
        #[test]
        fn prop_unescape_inverts_escape(text in ".*") {
            prop_assert_eq!(unescape(&escape(&text)), text);
        }

        #[test]
        fn prop_escaped_text_has_no_delimiters(text in ".*") {
            let escaped = escape(&text);
            prop_assert!(!escaped.contains('<'));
            prop_assert!(!escaped.contains('>'));
        }
    }
}
