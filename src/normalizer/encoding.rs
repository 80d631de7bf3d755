use std::borrow::Cow;
use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::app::{FreshetError, Result};

/// Text encodings a feed can be forced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
    Ascii,
    Windows1252,
}

/// Windows-1252 code points for bytes 0x80..=0x9F. Bytes it leaves
/// undefined keep their Latin-1 meaning.
const CP1252_C1: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

impl Encoding {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Encoding::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => Some(Encoding::Latin1),
            "us-ascii" | "ascii" => Some(Encoding::Ascii),
            "windows-1252" | "cp1252" => Some(Encoding::Windows1252),
            _ => None,
        }
    }

    pub fn parse_label(label: &str) -> Result<Self> {
        Self::from_label(label)
            .ok_or_else(|| FreshetError::FeedParse(format!("unsupported encoding \"{}\"", label)))
    }

    /// Decode `raw` to UTF-8. Invalid sequences become U+FFFD.
    pub fn decode<'a>(&self, raw: &'a [u8]) -> Cow<'a, str> {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(raw),
            Encoding::Ascii => {
                if raw.is_ascii() {
                    String::from_utf8_lossy(raw)
                } else {
                    Cow::Owned(
                        raw.iter()
                            .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                            .collect(),
                    )
                }
            }
            Encoding::Latin1 => Cow::Owned(raw.iter().map(|&b| b as char).collect()),
            Encoding::Windows1252 => Cow::Owned(
                raw.iter()
                    .map(|&b| match b {
                        0x80..=0x9F => CP1252_C1[usize::from(b - 0x80)],
                        _ => b as char,
                    })
                    .collect(),
            ),
        }
    }
}

/// Re-encode `raw` as UTF-8 and make the XML declaration say so.
pub fn transcode(raw: &[u8], encoding: Encoding) -> Vec<u8> {
    let text = encoding.decode(raw);
    DECLARATION
        .replace(text.as_bytes(), &b"${1}UTF-8${2}"[..])
        .into_owned()
}

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\A(\s*<\?xml[^>]*?encoding\s*=\s*["'])[^"']*(["'])"#).expect("static regex")
});

/// Pick the encoding to parse with: a forced one always applies (and must be
/// supported); a declared one only when it is understood.
pub fn effective(forced: Option<&str>, declared: Option<&str>) -> Result<Option<Encoding>> {
    match (forced, declared) {
        (Some(label), _) => Encoding::parse_label(label).map(Some),
        (None, Some(label)) => Ok(Encoding::from_label(label)),
        (None, None) => Ok(None),
    }
}
