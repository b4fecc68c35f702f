//! Text encodings and incremental decoding.
//!
//! Streams receive bytes in arbitrary chunks, so a multi-byte character may
//! be split across two reads. [`Decoder`] keeps the undecoded tail between
//! calls and only hands out complete characters.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Supported text encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// UTF-8.
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    /// 7-bit ASCII.
    Ascii,
}

impl Encoding {
    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
            Self::Ascii => "ascii",
        }
    }

    /// Encodes text, failing on characters the encoding cannot represent.
    pub fn encode(self, text: &str) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
            Self::Ascii if text.is_ascii() => Ok(Cow::Borrowed(text.as_bytes())),
            Self::Latin1 if text.is_ascii() => Ok(Cow::Borrowed(text.as_bytes())),
            Self::Ascii | Self::Latin1 => {
                let limit = if self == Self::Ascii { 0x7f } else { 0xff };
                text.chars()
                    .map(|c| {
                        u8::try_from(u32::from(c))
                            .ok()
                            .filter(|b| u32::from(*b) <= limit)
                            .ok_or_else(|| {
                                Error::invalid(format!("character {c:?} cannot be encoded as {self}"))
                            })
                    })
                    .collect::<Result<Vec<u8>>>()
                    .map(Cow::Owned)
            }
        }
    }

    /// Decodes a complete byte sequence.
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        let mut decoder = Decoder::new(self);
        let mut out = String::new();
        decoder.decode(bytes, &mut out)?;
        decoder.finish()?;
        Ok(out)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            _ => Err(Error::Config {
                message: format!("unknown encoding: {s}"),
            }),
        }
    }
}

/// Incremental decoder holding any undecoded trailing bytes.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    encoding: Encoding,
    pending: Vec<u8>,
}

impl Decoder {
    /// Creates a decoder for `encoding`.
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
        }
    }

    /// Bytes received but not yet decoded.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Decodes `input`, appending complete characters to `out`.
    ///
    /// Returns the number of characters appended, which is zero when the
    /// input only extended an incomplete sequence.
    pub fn decode(&mut self, input: &[u8], out: &mut String) -> Result<usize> {
        match self.encoding {
            Encoding::Utf8 => self.decode_utf8(input, out),
            Encoding::Latin1 => {
                out.extend(input.iter().map(|&b| char::from(b)));
                Ok(input.len())
            }
            Encoding::Ascii => {
                if let Some(offset) = input.iter().position(|b| !b.is_ascii()) {
                    return Err(Error::InvalidData {
                        offset,
                        reason: format!("byte 0x{:02x} is not ascii", input[offset]),
                    });
                }
                out.extend(input.iter().map(|&b| char::from(b)));
                Ok(input.len())
            }
        }
    }

    fn decode_utf8(&mut self, input: &[u8], out: &mut String) -> Result<usize> {
        let data: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(input)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(input);
            Cow::Owned(joined)
        };

        let valid = match std::str::from_utf8(&data) {
            Ok(text) => {
                out.push_str(text);
                return Ok(text.chars().count());
            }
            Err(err) => {
                if let Some(bad) = err.error_len() {
                    return Err(Error::InvalidData {
                        offset: err.valid_up_to(),
                        reason: format!("invalid utf-8 sequence of {bad} bytes"),
                    });
                }
                err.valid_up_to()
            }
        };

        let head = std::str::from_utf8(&data[..valid]).map_err(|e| Error::InvalidData {
            offset: e.valid_up_to(),
            reason: "invalid utf-8".to_string(),
        })?;
        out.push_str(head);
        self.pending = data[valid..].to_vec();
        Ok(head.chars().count())
    }

    /// Fails with [`Error::DecodeTruncation`] if undecoded bytes remain.
    pub fn finish(&self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(Error::DecodeTruncation {
                pending: self.pending.len(),
            })
        }
    }

    /// Drops undecoded bytes.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("utf-8", Encoding::Utf8)]
    #[test_case("UTF8", Encoding::Utf8)]
    #[test_case("latin_1", Encoding::Latin1)]
    #[test_case("iso-8859-1", Encoding::Latin1)]
    #[test_case("ascii", Encoding::Ascii)]
    fn test_parse_encoding(name: &str, expected: Encoding) {
        assert_eq!(name.parse::<Encoding>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_encoding() {
        let err = "ebcdic".parse::<Encoding>().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_utf8_split_sequence() {
        let bytes = "é".as_bytes();
        let mut decoder = Decoder::new(Encoding::Utf8);
        let mut out = String::new();

        assert_eq!(decoder.decode(&bytes[..1], &mut out).unwrap(), 0);
        assert_eq!(decoder.pending(), &bytes[..1]);
        assert!(out.is_empty());

        assert_eq!(decoder.decode(&bytes[1..], &mut out).unwrap(), 1);
        assert_eq!(out, "é");
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_utf8_truncated_at_finish() {
        let mut decoder = Decoder::new(Encoding::Utf8);
        let mut out = String::new();
        decoder.decode(b"ab\xe4\xb8", &mut out).unwrap();
        assert_eq!(out, "ab");
        assert!(matches!(
            decoder.finish(),
            Err(Error::DecodeTruncation { pending: 2 })
        ));
    }

    #[test]
    fn test_utf8_invalid() {
        let mut decoder = Decoder::new(Encoding::Utf8);
        let mut out = String::new();
        let err = decoder.decode(b"ok\xff", &mut out).unwrap_err();
        assert!(matches!(err, Error::InvalidData { offset: 2, .. }));
    }

    #[test]
    fn test_latin1_roundtrip() {
        let text = Encoding::Latin1.decode(&[0x61, 0xe9, 0xff]).unwrap();
        assert_eq!(text, "aéÿ");
        assert_eq!(Encoding::Latin1.encode(&text).unwrap().as_ref(), &[0x61, 0xe9, 0xff]);
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        assert!(Encoding::Ascii.decode(b"\x80").is_err());
        assert!(Encoding::Ascii.encode("é").is_err());
        assert!(Encoding::Latin1.encode("世").is_err());
    }
}
