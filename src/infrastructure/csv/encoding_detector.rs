// ============================================================
// ENCODING DETECTOR
// ============================================================
// Guess a file's byte encoding from a head sample, guarding against
// "ASCII" guesses that miss special characters later in the file

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::domain::csv::TextEncoding;

/// Bytes read from the start of the file for statistical inference
const HEAD_SAMPLE_SIZE: usize = 10 * 1024;

/// Bytes re-checked at the end of the file when the head looks like ASCII
const TAIL_SAMPLE_SIZE: u64 = 50_000;

const ASCII_RECHECK_CONFIDENCE: f32 = 0.9;
const MIN_CONFIDENCE: f32 = 0.7;

/// Raw statistical guess
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingGuess {
    pub label: String,
    pub confidence: f32,
}

/// Encoding detector; never fails its caller.
#[derive(Debug, Clone)]
pub struct EncodingDetector {
    head_sample_size: usize,
    tail_sample_size: u64,
}

impl Default for EncodingDetector {
    fn default() -> Self {
        Self {
            head_sample_size: HEAD_SAMPLE_SIZE,
            tail_sample_size: TAIL_SAMPLE_SIZE,
        }
    }
}

impl EncodingDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect the encoding of `path`, falling back to UTF-8 on any failure.
    pub fn detect(&self, path: &Path) -> TextEncoding {
        match self.guess(path) {
            Ok(guess) => {
                info!(
                    file = %path.display(),
                    encoding = %guess.label,
                    confidence = guess.confidence,
                    "Encoding inferred"
                );
                self.resolve(path, &guess)
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "Encoding detection failed, using utf-8");
                TextEncoding::Utf8
            }
        }
    }

    /// Statistical inference over the head sample.
    pub fn guess(&self, path: &Path) -> io::Result<EncodingGuess> {
        let mut sample = Vec::with_capacity(self.head_sample_size);
        File::open(path)?
            .take(self.head_sample_size as u64)
            .read_to_end(&mut sample)?;

        let (charset, confidence, _language) = chardet::detect(&sample);
        Ok(EncodingGuess {
            label: chardet::charset2encoding(&charset).to_string(),
            confidence,
        })
    }

    /// Apply the ASCII guards and confidence thresholds to a guess.
    pub fn resolve(&self, path: &Path, guess: &EncodingGuess) -> TextEncoding {
        let detected = TextEncoding::from_label(&guess.label);
        let is_ascii = detected == Some(TextEncoding::Ascii);

        if is_ascii && guess.confidence > ASCII_RECHECK_CONFIDENCE {
            match self.tail_is_ascii(path) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        file = %path.display(),
                        "Detected as ASCII but the tail holds non-ASCII bytes, using utf-8"
                    );
                    return TextEncoding::Utf8;
                }
                Err(e) => {
                    warn!(
                        file = %path.display(),
                        error = %e,
                        "Could not re-check file tail, using utf-8"
                    );
                    return TextEncoding::Utf8;
                }
            }
        }

        if is_ascii && has_text_extension(path) {
            debug!(file = %path.display(), "ASCII text file, widening to utf-8");
            return TextEncoding::Utf8;
        }

        match detected {
            Some(encoding) if guess.confidence > MIN_CONFIDENCE => encoding,
            _ => {
                warn!(
                    file = %path.display(),
                    encoding = %guess.label,
                    confidence = guess.confidence,
                    "Low confidence or unknown encoding, using utf-8"
                );
                TextEncoding::Utf8
            }
        }
    }

    fn tail_is_ascii(&self, path: &Path) -> io::Result<bool> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        file.seek(SeekFrom::Start(len.saturating_sub(self.tail_sample_size)))?;

        let mut tail = Vec::new();
        file.take(self.tail_sample_size).read_to_end(&mut tail)?;
        Ok(tail.is_ascii())
    }
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}
