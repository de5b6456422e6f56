// ============================================================
// STRICT DECODING READER
// ============================================================
// Transcode a byte stream to UTF-8, failing on the first malformed sequence

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use encoding_rs::{Decoder, DecoderResult, UTF_8, WINDOWS_1252};
use thiserror::Error;

use crate::domain::csv::TextEncoding;

const RAW_BLOCK_SIZE: usize = 8 * 1024;

/// The byte stream is not valid in the chosen encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{encoding}' cannot decode byte at offset {offset}")]
pub struct DecodeError {
    pub encoding: &'static str,
    pub offset: u64,
}

impl DecodeError {
    fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }

    /// Recover a decode failure that travelled through `io::Error`.
    pub fn from_io(err: &io::Error) -> Option<DecodeError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<DecodeError>())
            .cloned()
    }
}

enum Transcoder {
    Ascii,
    Latin1,
    Whatwg(Decoder),
}

impl Transcoder {
    fn for_encoding(encoding: TextEncoding) -> Self {
        match encoding {
            TextEncoding::Ascii => Transcoder::Ascii,
            TextEncoding::Latin1 => Transcoder::Latin1,
            TextEncoding::Utf8 => Transcoder::Whatwg(UTF_8.new_decoder_with_bom_removal()),
            TextEncoding::Windows1252 => {
                Transcoder::Whatwg(WINDOWS_1252.new_decoder_without_bom_handling())
            }
            TextEncoding::Other(encoding) => {
                Transcoder::Whatwg(encoding.new_decoder_with_bom_removal())
            }
        }
    }

    /// Append the decoded form of `src` to `dst`. On failure the text before
    /// the malformed sequence is still appended and the index within `src`
    /// where that sequence starts is returned.
    fn decode(&mut self, src: &[u8], dst: &mut String, last: bool) -> Result<(), usize> {
        match self {
            Transcoder::Ascii => {
                let valid = src.iter().position(|b| !b.is_ascii()).unwrap_or(src.len());
                dst.extend(src[..valid].iter().map(|&b| b as char));
                if valid < src.len() {
                    Err(valid)
                } else {
                    Ok(())
                }
            }
            Transcoder::Latin1 => {
                dst.extend(src.iter().map(|&b| b as char));
                Ok(())
            }
            Transcoder::Whatwg(decoder) => {
                let mut consumed = 0;
                loop {
                    let remaining = &src[consumed..];
                    if let Some(needed) =
                        decoder.max_utf8_buffer_length_without_replacement(remaining.len())
                    {
                        dst.reserve(needed);
                    }
                    let (result, read) =
                        decoder.decode_to_string_without_replacement(remaining, dst, last);
                    consumed += read;
                    match result {
                        DecoderResult::InputEmpty => return Ok(()),
                        DecoderResult::OutputFull => dst.reserve(remaining.len().max(16)),
                        DecoderResult::Malformed(bad, extra) => {
                            // The sequence may have started in an earlier block.
                            return Err(consumed.saturating_sub(bad as usize + extra as usize));
                        }
                    }
                }
            }
        }
    }
}

/// `Read` adapter yielding UTF-8 for a file in any [`TextEncoding`].
///
/// Text before a malformed sequence is delivered first; the sequence itself
/// surfaces as an `io::ErrorKind::InvalidData` error wrapping a
/// [`DecodeError`], and the reader stays failed afterwards.
pub struct DecodingReader<R> {
    inner: R,
    encoding: TextEncoding,
    transcoder: Transcoder,
    raw: Vec<u8>,
    decoded: String,
    decoded_pos: usize,
    offset: u64,
    finished: bool,
    failed: Option<DecodeError>,
}

impl DecodingReader<File> {
    pub fn open(path: &Path, encoding: TextEncoding) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?, encoding))
    }
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: TextEncoding) -> Self {
        Self {
            inner,
            encoding,
            transcoder: Transcoder::for_encoding(encoding),
            raw: vec![0; RAW_BLOCK_SIZE],
            decoded: String::new(),
            decoded_pos: 0,
            offset: 0,
            finished: false,
            failed: None,
        }
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    fn refill(&mut self) -> io::Result<()> {
        self.decoded.clear();
        self.decoded_pos = 0;

        while self.decoded.is_empty() && !self.finished {
            let read = match self.inner.read(&mut self.raw) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let last = read == 0;

            if let Err(pos) = self
                .transcoder
                .decode(&self.raw[..read], &mut self.decoded, last)
            {
                let failure = DecodeError {
                    encoding: self.encoding.label(),
                    offset: self.offset + pos as u64,
                };
                self.failed = Some(failure.clone());
                self.finished = true;
                if self.decoded.is_empty() {
                    return Err(failure.into_io());
                }
                return Ok(());
            }

            self.offset += read as u64;
            if last {
                self.finished = true;
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.decoded_pos >= self.decoded.len() {
            if let Some(failure) = &self.failed {
                return Err(failure.clone().into_io());
            }
            self.refill()?;
        }

        let pending = &self.decoded.as_bytes()[self.decoded_pos..];
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        self.decoded_pos += n;
        Ok(n)
    }
}

/// Decode the whole file under `encoding` without keeping the text.
pub fn validate_file(path: &Path, encoding: TextEncoding) -> io::Result<u64> {
    let mut reader = DecodingReader::open(path, encoding)?;
    io::copy(&mut reader, &mut io::sink())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode_all(bytes: &[u8], encoding: TextEncoding) -> io::Result<String> {
        let mut reader = DecodingReader::new(Cursor::new(bytes.to_vec()), encoding);
        let mut out = String::new();
        reader.read_to_string(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_utf8_passthrough_and_bom_removal() {
        let text = decode_all("\u{feff}id,nome\n1,João\n".as_bytes(), TextEncoding::Utf8).unwrap();
        assert_eq!(text, "id,nome\n1,João\n");
    }

    #[test]
    fn test_latin1_maps_every_byte() {
        let text = decode_all(b"caf\xe9\n", TextEncoding::Latin1).unwrap();
        assert_eq!(text, "café\n");
    }

    #[test]
    fn test_cp1252_specials() {
        let text = decode_all(b"\x80 \x93x\x94", TextEncoding::Windows1252).unwrap();
        assert_eq!(text, "€ \u{201c}x\u{201d}");
    }

    #[test]
    fn test_invalid_utf8_reports_offset() {
        let err = decode_all(b"abc\xe9def", TextEncoding::Utf8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let decode = DecodeError::from_io(&err).unwrap();
        assert_eq!(decode.encoding, "utf-8");
        assert_eq!(decode.offset, 3);
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        let err = decode_all(b"plain\xc3\xa9", TextEncoding::Ascii).unwrap_err();
        let decode = DecodeError::from_io(&err).unwrap();
        assert_eq!(decode.offset, 5);
    }

    #[test]
    fn test_multibyte_sequence_split_across_blocks() {
        let mut bytes = vec![b'a'; RAW_BLOCK_SIZE - 1];
        bytes.extend("é".as_bytes());
        bytes.extend(b"z");

        let text = decode_all(&bytes, TextEncoding::Utf8).unwrap();
        assert!(text.ends_with("éz"));
        assert_eq!(text.chars().count(), RAW_BLOCK_SIZE + 1);
    }

    #[test]
    fn test_truncated_utf8_at_eof_fails() {
        let err = decode_all(b"ok\xc3", TextEncoding::Utf8).unwrap_err();
        assert!(DecodeError::from_io(&err).is_some());
    }

    #[test]
    fn test_valid_prefix_is_delivered_before_the_error() {
        let mut reader =
            DecodingReader::new(Cursor::new(b"id;nome\nJos\xe9\n".to_vec()), TextEncoding::Utf8);
        let mut buf = [0u8; 64];

        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"id;nome\nJos");
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn test_reader_stays_failed() {
        let mut reader = DecodingReader::new(Cursor::new(b"\xff".to_vec()), TextEncoding::Utf8);
        let mut buf = [0u8; 16];
        assert!(reader.read(&mut buf).is_err());
        assert!(reader.read(&mut buf).is_err());
    }
}
