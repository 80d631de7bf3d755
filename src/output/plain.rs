//! HTML-to-plain-text conversion used by the sinks.

use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;

/// Typographic characters and their ASCII stand-ins.
const FOLDS: [(char, &str); 12] = [
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201A}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{201E}', "\""),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2026}', "..."),
    ('\u{2122}', "(TM)"),
    ('\u{00A0}', " "),
    ('\u{2022}', "*"),
];

static BLOCK_BREAKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br\s*/?|/p|/div|/li|/h[1-6]|p|li)\b[^>]*>").expect("static regex")
});

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// Replace typographic punctuation with ASCII.
pub fn fold_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match FOLDS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

/// Strip markup, decode entities and fold punctuation. Paragraphs come back
/// separated by blank lines with inner whitespace collapsed.
pub fn to_plain_text(html: &str) -> String {
    let with_breaks = BLOCK_BREAKS.replace_all(html, "\n\n");
    let stripped = TAGS.replace_all(&with_breaks, "");
    let decoded = decode_html_entities(&stripped);
    let folded = fold_punctuation(&decoded);

    folded
        .split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_punctuation() {
        assert_eq!(
            fold_punctuation("\u{201C}Rust\u{201D} \u{2014} it\u{2019}s fast\u{2026}"),
            "\"Rust\" -- it's fast..."
        );
    }

    #[test]
    fn test_to_plain_text() {
        let html = "<p>First &amp; <b>bold</b>\n  line</p><p>Second<br/>third</p>";
        assert_eq!(to_plain_text(html), "First & bold line\n\nSecond\n\nthird");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(to_plain_text("just words"), "just words");
        assert_eq!(to_plain_text("   "), "");
    }
}
