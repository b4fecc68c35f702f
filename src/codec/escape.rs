//! Escape codec for showing arbitrary bytes on a terminal and typing them back.
//!
//! Encoding keeps printable ASCII and `\n`, doubles backslashes and renders
//! every other byte as `\xHH`. Decoding understands `\\`, `\0`, `\xHH` and
//! `\#expr#` (see [`expr`](super::expr)); a backslash before anything else
//! is dropped.

use super::expr;
use crate::core::{Buffer, Decoder, Delimiter, Encoding, RawBuffer, Take};
use crate::error::{Error, Result};
use std::fmt::Write as _;

/// Renders `bytes` for display.
///
/// # Examples
///
/// ```
/// use unified_io::codec::escape;
///
/// assert_eq!(escape::encode(b"ok\n\x00\\"), "ok\n\\x00\\\\");
/// ```
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' | 32..=126 => out.push(char::from(b)),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out
}

/// Incremental decoder for typed escape sequences.
///
/// Text that ends inside an escape is held back until the rest arrives.
#[derive(Debug, Clone, Default)]
pub struct EscapeDecoder {
    pending: String,
    encoding: Encoding,
}

impl EscapeDecoder {
    /// Creates a decoder that encodes plain text with `encoding`.
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self {
            pending: String::new(),
            encoding,
        }
    }

    /// Text held back because it ends inside an escape.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Decodes `input`, appending the resulting bytes to `out`.
    ///
    /// An expression that fails to evaluate is passed through as typed.
    pub fn decode(&mut self, input: &str, out: &mut Vec<u8>) -> Result<()> {
        self.pending.push_str(input);
        let text = std::mem::take(&mut self.pending);
        let mut rest = text.as_str();

        while let Some(pos) = rest.find('\\') {
            out.extend_from_slice(&self.encoding.encode(&rest[..pos])?);
            rest = &rest[pos..];

            let Some(kind) = rest[1..].chars().next() else {
                break;
            };
            match kind {
                '\\' => {
                    out.push(b'\\');
                    rest = &rest[2..];
                }
                '0' => {
                    out.push(0);
                    rest = &rest[2..];
                }
                'x' => {
                    let Some(hex) = rest.get(2..4) else {
                        if rest.len() < 4 {
                            break;
                        }
                        // a multi-byte character right after `\x`
                        rest = &rest[1..];
                        continue;
                    };
                    match u8::from_str_radix(hex, 16) {
                        Ok(byte) if hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
                            out.push(byte);
                            rest = &rest[4..];
                        }
                        _ => rest = &rest[1..],
                    }
                }
                '#' => {
                    let Some(end) = rest[2..].find('#') else {
                        break;
                    };
                    let src = &rest[2..2 + end];
                    match expr::eval(src, self.encoding) {
                        Ok(bytes) => out.extend(bytes),
                        Err(err) => {
                            tracing::warn!(expr = src, error = %err, "escape expression failed");
                            out.extend_from_slice(&self.encoding.encode(&rest[..end + 3])?);
                        }
                    }
                    rest = &rest[end + 3..];
                }
                _ => rest = &rest[1..],
            }
        }

        if rest.starts_with('\\') {
            self.pending = rest.to_string();
        } else {
            out.extend_from_slice(&self.encoding.encode(rest)?);
        }
        Ok(())
    }

    /// Fails with [`Error::DecodeTruncation`] if an escape is incomplete.
    pub fn finish(&self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(Error::DecodeTruncation {
                pending: self.pending.len(),
            })
        }
    }

    /// Drops held-back text.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Input buffer for a terminal: decodes typed text, then escapes, and
/// stores the resulting raw bytes.
#[derive(Debug, Clone, Default)]
pub struct EscapeBuffer {
    data: RawBuffer,
    text: Decoder,
    escapes: EscapeDecoder,
    encoding: Encoding,
}

impl EscapeBuffer {
    /// Creates an empty buffer for terminal input in `encoding`.
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self {
            data: RawBuffer::new(encoding),
            text: Decoder::new(encoding),
            escapes: EscapeDecoder::new(encoding),
            encoding,
        }
    }
}

impl Buffer for EscapeBuffer {
    type Data = Vec<u8>;

    const BINARY: bool = true;

    fn with_encoding(encoding: Encoding) -> Self {
        Self::new(encoding)
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn put(&mut self, raw: &[u8]) -> Result<usize> {
        let mut typed = String::new();
        self.text.decode(raw, &mut typed)?;
        let mut bytes = Vec::new();
        self.escapes.decode(&typed, &mut bytes)?;
        self.data.put(&bytes)
    }

    fn get(&mut self, take: Take) -> Vec<u8> {
        self.data.get(take)
    }

    fn unget(&mut self, data: Vec<u8>) {
        self.data.unget(data);
    }

    fn eof(&mut self) -> Result<()> {
        self.text.finish()?;
        self.escapes.finish()
    }

    fn clear(&mut self) {
        self.data.clear();
        self.text.reset();
        self.escapes.reset();
    }

    fn units(&self) -> usize {
        self.data.units()
    }

    fn storage(&self) -> &[u8] {
        self.data.storage()
    }

    fn offset_of(&self, units: usize) -> Option<usize> {
        self.data.offset_of(units)
    }

    fn raw_len(&self) -> usize {
        self.data.raw_len() + self.text.pending().len() + self.escapes.pending().len()
    }

    fn needle(&self, delimiter: Delimiter<'_>) -> Result<Vec<u8>> {
        self.data.needle(delimiter)
    }

    fn split_lines(data: Vec<u8>, keep: bool) -> Vec<Vec<u8>> {
        RawBuffer::split_lines(data, keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn decode_all(chunks: &[&str]) -> (Vec<u8>, String) {
        let mut decoder = EscapeDecoder::default();
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.decode(chunk, &mut out).unwrap();
        }
        (out, decoder.pending().to_string())
    }

    #[test_case(b"plain text", "plain text" ; "printable")]
    #[test_case(b"a\nb", "a\nb" ; "newline kept")]
    #[test_case(b"\\", "\\\\" ; "backslash")]
    #[test_case(b"\x00\x7f\xff\t", "\\x00\\x7f\\xff\\x09" ; "non printable")]
    fn test_encode(input: &[u8], expected: &str) {
        assert_eq!(encode(input), expected);
    }

    #[test_case(&["\\x41\\x42"], b"AB" ; "hex")]
    #[test_case(&["a\\\\b"], b"a\\b" ; "backslash")]
    #[test_case(&["\\0"], b"\x00" ; "nul")]
    #[test_case(&["\\q"], b"q" ; "unknown escape drops backslash")]
    #[test_case(&["\\#'A' * 3#!"], b"AAA!" ; "expression")]
    #[test_case(&["\\#p8(300)#"], b"\\#p8(300)#" ; "failed expression passes through")]
    #[test_case(&["\\xzz"], b"xzz" ; "bad hex drops backslash")]
    fn test_decode(chunks: &[&str], expected: &[u8]) {
        let (out, pending) = decode_all(chunks);
        assert_eq!(out, expected);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_decode_across_chunks() {
        let (out, pending) = decode_all(&["ab\\", "x4"]);
        assert_eq!(out, b"ab");
        assert_eq!(pending, "\\x4");

        let (out, pending) = decode_all(&["ab\\", "x4", "1c\\#'z'", "#"]);
        assert_eq!(out, b"abAcz");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_encode_decode_inverse() {
        let bytes: Vec<u8> = (0..=255).collect();
        let (out, _) = decode_all(&[&encode(&bytes)]);
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_buffer_truncated_escape() {
        let mut buffer = EscapeBuffer::default();
        assert_eq!(buffer.put(b"hi\\x").unwrap(), 2);
        assert_eq!(buffer.raw_len(), 4);
        assert!(matches!(buffer.eof(), Err(Error::DecodeTruncation { pending: 2 })));
        assert_eq!(buffer.put(b"0a").unwrap(), 1);
        assert_eq!(buffer.get(Take::all()), b"hi\n");
        buffer.eof().unwrap();
    }
}
