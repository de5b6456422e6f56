// ============================================================
// DIALECT DETECTOR
// ============================================================
// Choose between comma and semicolon from the first non-blank line

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use tracing::{error, info, warn};

use super::decoding_reader::DecodingReader;
use crate::domain::csv::{Delimiter, TextEncoding};

pub struct DialectDetector;

impl DialectDetector {
    /// Detect the delimiter of `path` read as `encoding`. Defaults to `,`
    /// when the file has no non-blank line or cannot be read.
    pub fn detect(path: &Path, encoding: TextEncoding) -> Delimiter {
        let detected = DecodingReader::open(path, encoding)
            .and_then(Self::detect_in);

        match detected {
            Ok(Some(delimiter)) => {
                info!(file = %path.display(), delimiter = %delimiter, "Delimiter detected");
                delimiter
            }
            Ok(None) => {
                warn!(file = %path.display(), "No non-blank line found, using ','");
                Delimiter::Comma
            }
            Err(e) => {
                error!(
                    file = %path.display(),
                    encoding = %encoding,
                    error = %e,
                    "Delimiter detection failed, using ','"
                );
                Delimiter::Comma
            }
        }
    }

    /// Inspect the first non-blank line of an already decoded stream.
    pub fn detect_in<R: Read>(reader: R) -> io::Result<Option<Delimiter>> {
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(Delimiter::from_line(trimmed)));
            }
        }
        Ok(None)
    }
}
