// ============================================================
// TEXT ENCODINGS
// ============================================================
// Supported byte encodings and the ranked fallback order

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::fmt;

/// A byte encoding a CSV file can be read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    /// Strict 7-bit ASCII
    Ascii,
    Utf8,
    /// ISO-8859-1, every byte maps to the code point of the same value
    Latin1,
    /// Windows code page 1252
    Windows1252,
    /// Any other encoding known to `encoding_rs`
    Other(&'static Encoding),
}

/// Fallbacks tried after the preferred encoding. `iso-8859-1` is the same
/// encoding as `latin1` and collapses into it.
const FALLBACK_CHAIN: [TextEncoding; 3] = [
    TextEncoding::Utf8,
    TextEncoding::Latin1,
    TextEncoding::Windows1252,
];

impl TextEncoding {
    /// Resolve an encoding label such as `utf-8`, `ISO-8859-1` or `cp1252`.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        let encoding = match normalized.as_str() {
            "ascii" | "us-ascii" => TextEncoding::Ascii,
            "utf-8" | "utf8" | "utf-8-sig" => TextEncoding::Utf8,
            "latin1" | "latin-1" | "l1" | "iso-8859-1" | "iso8859-1" | "iso_8859-1" => {
                TextEncoding::Latin1
            }
            "cp1252" | "windows-1252" | "x-cp1252" => TextEncoding::Windows1252,
            other => {
                let encoding = Encoding::for_label(other.as_bytes())?;
                if encoding == UTF_8 {
                    TextEncoding::Utf8
                } else if encoding == WINDOWS_1252 {
                    TextEncoding::Windows1252
                } else {
                    TextEncoding::Other(encoding)
                }
            }
        };
        Some(encoding)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Ascii => "ascii",
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin1",
            TextEncoding::Windows1252 => "cp1252",
            TextEncoding::Other(encoding) => encoding.name(),
        }
    }

    /// Preferred encoding followed by the fallback chain, without duplicates.
    pub fn ranked_candidates(preferred: TextEncoding) -> Vec<TextEncoding> {
        let mut ranked = Vec::with_capacity(FALLBACK_CHAIN.len() + 1);
        for candidate in std::iter::once(preferred).chain(FALLBACK_CHAIN) {
            if !ranked.contains(&candidate) {
                ranked.push(candidate);
            }
        }
        ranked
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
