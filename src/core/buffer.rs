//! Input and output buffers for unified streams.
//!
//! A stream owns one input [`Buffer`] holding data that has been received
//! but not yet consumed, and one [`OutputBuffer`] holding data waiting to
//! be flushed. The input buffer's element type (raw bytes or decoded text)
//! is fixed by the buffer strategy chosen at construction.
//!
//! Positions handed to [`Buffer::get`] are storage offsets: byte offsets
//! into the raw data for [`RawBuffer`], byte offsets into the decoded UTF-8
//! storage for [`TextBuffer`](super::TextBuffer). Logical lengths
//! ([`Buffer::units`]) count bytes or characters respectively.

use crate::core::encoding::Encoding;
use crate::core::payload::Payload;
use crate::error::{Error, Result};
use std::fmt::Debug;
use std::ops::Range;

/// Line separator appended by line-oriented writes and matched by line reads.
pub const LINE_SEPARATOR: &str = "\n";

/// What to do with a matched delimiter when taking a prefix from a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelimiterMode {
    /// Return the prefix and leave the delimiter in the buffer.
    Exclude,
    /// Return the prefix and discard the delimiter.
    #[default]
    Drop,
    /// Return the prefix together with the delimiter.
    Keep,
}

impl DelimiterMode {
    /// Combines the `keep` and `drop` flags. `keep` wins over `drop`.
    #[must_use]
    pub const fn from_flags(keep: bool, drop: bool) -> Self {
        if keep {
            Self::Keep
        } else if drop {
            Self::Drop
        } else {
            Self::Exclude
        }
    }
}

/// Describes which prefix [`Buffer::get`] removes and returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Take {
    end: Option<usize>,
    needle: usize,
    mode: DelimiterMode,
    peek: bool,
}

impl Take {
    /// Everything currently buffered.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            end: None,
            needle: 0,
            mode: DelimiterMode::Exclude,
            peek: false,
        }
    }

    /// The prefix ending at storage offset `end`.
    #[must_use]
    pub const fn prefix(end: usize) -> Self {
        Self {
            end: Some(end),
            needle: 0,
            mode: DelimiterMode::Exclude,
            peek: false,
        }
    }

    /// The prefix before a delimiter of `needle` storage units found at `pos`.
    #[must_use]
    pub const fn delimited(pos: usize, needle: usize, mode: DelimiterMode) -> Self {
        Self {
            end: Some(pos),
            needle,
            mode,
            peek: false,
        }
    }

    /// Leaves the buffer untouched.
    #[must_use]
    pub const fn peek(mut self) -> Self {
        self.peek = true;
        self
    }

    /// Returns true when the buffer must not be modified.
    #[must_use]
    pub const fn is_peek(&self) -> bool {
        self.peek
    }

    /// Resolves to `(returned, consumed)` storage offsets for a buffer of `len`.
    #[must_use]
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let Some(pos) = self.end else {
            return (len, len);
        };
        let (left, right) = match self.mode {
            DelimiterMode::Keep => (pos + self.needle, pos + self.needle),
            DelimiterMode::Drop => (pos, pos + self.needle),
            DelimiterMode::Exclude => (pos, pos),
        };
        (left.min(len), right.min(len))
    }
}

/// A delimiter given either as text or as raw bytes.
///
/// Either form is accepted by both buffer kinds; the buffer converts it into
/// its own representation with [`Buffer::needle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter<'a> {
    /// Text delimiter, encoded with the buffer's encoding when matched against bytes.
    Text(&'a str),
    /// Byte delimiter, decoded with the buffer's encoding when matched against text.
    Bytes(&'a [u8]),
}

impl<'a> From<&'a str> for Delimiter<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for Delimiter<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a [u8]> for Delimiter<'a> {
    fn from(value: &'a [u8]) -> Self {
        Self::Bytes(value)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Delimiter<'a> {
    fn from(value: &'a [u8; N]) -> Self {
        Self::Bytes(value)
    }
}

impl<'a> From<&'a Vec<u8>> for Delimiter<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Input buffer strategy.
///
/// `put` feeds raw bytes received from a backend; everything else works on
/// the buffer's own representation.
pub trait Buffer: Send + Debug + 'static {
    /// Value returned by reads: `Vec<u8>` for raw buffers, `String` for text.
    type Data: Debug + Clone + Default + PartialEq + Send + AsRef<[u8]>;

    /// Whether this buffer hands out raw bytes.
    const BINARY: bool;

    /// Creates an empty buffer using `encoding`.
    fn with_encoding(encoding: Encoding) -> Self
    where
        Self: Sized;

    /// Encoding used to convert text delimiters and payloads.
    fn encoding(&self) -> Encoding;

    /// Appends raw input, returning the number of newly available units.
    ///
    /// Zero is a valid answer: a decoder may have consumed bytes without
    /// completing a character. It never means end of stream.
    fn put(&mut self, raw: &[u8]) -> Result<usize>;

    /// Removes (unless peeking) and returns the prefix described by `take`.
    fn get(&mut self, take: Take) -> Self::Data;

    /// Puts previously removed data back at the front.
    fn unget(&mut self, data: Self::Data);

    /// Signals end of input; fails if undecoded bytes remain.
    fn eof(&mut self) -> Result<()>;

    /// Drops all buffered data and decoder state.
    fn clear(&mut self);

    /// Logical length in units (bytes or characters).
    fn units(&self) -> usize;

    /// Storage view searched for delimiters.
    fn storage(&self) -> &[u8];

    /// Storage offset just past the first `units` units, if that many are buffered.
    fn offset_of(&self, units: usize) -> Option<usize>;

    /// Encoded size of buffered input, including undecoded bytes.
    fn raw_len(&self) -> usize;

    /// Converts a delimiter into this buffer's storage representation.
    fn needle(&self, delimiter: Delimiter<'_>) -> Result<Vec<u8>>;

    /// Splits data into lines, optionally keeping terminators.
    fn split_lines(data: Self::Data, keep: bool) -> Vec<Self::Data>;

    /// Storage length.
    fn len(&self) -> usize {
        self.storage().len()
    }

    /// Returns true when nothing is buffered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds `needle` in storage at or after offset `from`.
    fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        let haystack = self.storage().get(from..)?;
        find_subslice(haystack, needle).map(|pos| pos + from)
    }
}

/// Buffer of raw bytes.
#[derive(Debug, Clone, Default)]
pub struct RawBuffer {
    data: Vec<u8>,
    encoding: Encoding,
}

impl RawBuffer {
    /// Creates an empty raw buffer; `encoding` applies to text delimiters.
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self {
            data: Vec::new(),
            encoding,
        }
    }
}

impl Buffer for RawBuffer {
    type Data = Vec<u8>;

    const BINARY: bool = true;

    fn with_encoding(encoding: Encoding) -> Self {
        Self::new(encoding)
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn put(&mut self, raw: &[u8]) -> Result<usize> {
        self.data.extend_from_slice(raw);
        Ok(raw.len())
    }

    fn get(&mut self, take: Take) -> Vec<u8> {
        let (left, right) = take.bounds(self.data.len());
        let res = self.data[..left].to_vec();
        if !take.is_peek() {
            self.data.drain(..right);
        }
        res
    }

    fn unget(&mut self, data: Vec<u8>) {
        self.data.splice(0..0, data);
    }

    fn eof(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn units(&self) -> usize {
        self.data.len()
    }

    fn storage(&self) -> &[u8] {
        &self.data
    }

    fn offset_of(&self, units: usize) -> Option<usize> {
        (units <= self.data.len()).then_some(units)
    }

    fn raw_len(&self) -> usize {
        self.data.len()
    }

    fn needle(&self, delimiter: Delimiter<'_>) -> Result<Vec<u8>> {
        match delimiter {
            Delimiter::Bytes(bytes) => Ok(bytes.to_vec()),
            Delimiter::Text(text) => Ok(self.encoding.encode(text)?.into_owned()),
        }
    }

    fn split_lines(data: Vec<u8>, keep: bool) -> Vec<Vec<u8>> {
        line_ranges(&data, keep)
            .into_iter()
            .map(|range| data[range].to_vec())
            .collect()
    }
}

/// Pending output, flushed by the backend's overflow operation.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    data: Vec<u8>,
    encoding: Encoding,
}

impl OutputBuffer {
    /// Creates an empty output buffer encoding text with `encoding`.
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self {
            data: Vec::new(),
            encoding,
        }
    }

    /// Appends a serialized payload, returning the number of bytes added.
    pub fn put<P: Payload + ?Sized>(&mut self, payload: &P) -> Result<usize> {
        let before = self.data.len();
        if let Err(err) = payload.encode_into(self.encoding, &mut self.data) {
            self.data.truncate(before);
            return Err(err);
        }
        Ok(self.data.len() - before)
    }

    /// Appends the line separator.
    pub fn end_line(&mut self) {
        self.data.extend_from_slice(LINE_SEPARATOR.as_bytes());
    }

    /// Takes everything pending.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Number of pending bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Finds the first occurrence of `needle` in `haystack`.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Splits `data` at `\n`, `\r\n` and `\r`, returning the byte range of each line.
pub(crate) fn line_ranges(data: &[u8], keep: bool) -> Vec<Range<usize>> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < data.len() {
        let terminator = match data[i] {
            b'\n' => 1,
            b'\r' if data.get(i + 1) == Some(&b'\n') => 2,
            b'\r' => 1,
            _ => 0,
        };
        if terminator == 0 {
            i += 1;
            continue;
        }
        let end = if keep { i + terminator } else { i };
        lines.push(start..end);
        i += terminator;
        start = i;
    }
    if start < data.len() {
        lines.push(start..data.len());
    }
    lines
}

pub(crate) fn empty_delimiter() -> Error {
    Error::invalid("delimiter must not be empty")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(data: &[u8]) -> RawBuffer {
        let mut buffer = RawBuffer::default();
        buffer.put(data).unwrap();
        buffer
    }

    #[test]
    fn test_get_all_clears() {
        let mut buffer = filled(b"hello");
        assert_eq!(buffer.get(Take::all()), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_get_prefix() {
        let mut buffer = filled(b"hello world");
        assert_eq!(buffer.get(Take::prefix(5)), b"hello");
        assert_eq!(buffer.get(Take::all()), b" world");
    }

    #[test]
    fn test_get_peek_leaves_data() {
        let mut buffer = filled(b"hello");
        assert_eq!(buffer.get(Take::prefix(2).peek()), b"he");
        assert_eq!(buffer.get(Take::all().peek()), b"hello");
        assert_eq!(buffer.units(), 5);
    }

    #[test]
    fn test_get_delimiter_modes() {
        let mut buffer = filled(b"key=value");
        assert_eq!(
            buffer.get(Take::delimited(3, 1, DelimiterMode::Exclude)),
            b"key"
        );
        assert_eq!(buffer.get(Take::all().peek()), b"=value");

        let mut buffer = filled(b"key=value");
        assert_eq!(buffer.get(Take::delimited(3, 1, DelimiterMode::Drop)), b"key");
        assert_eq!(buffer.get(Take::all().peek()), b"value");

        let mut buffer = filled(b"key=value");
        assert_eq!(
            buffer.get(Take::delimited(3, 1, DelimiterMode::Keep)),
            b"key="
        );
        assert_eq!(buffer.get(Take::all().peek()), b"value");
    }

    #[test]
    fn test_keep_overrides_drop() {
        assert_eq!(DelimiterMode::from_flags(true, true), DelimiterMode::Keep);
        assert_eq!(DelimiterMode::from_flags(true, false), DelimiterMode::Keep);
        assert_eq!(DelimiterMode::from_flags(false, true), DelimiterMode::Drop);
        assert_eq!(
            DelimiterMode::from_flags(false, false),
            DelimiterMode::Exclude
        );
    }

    #[test]
    fn test_unget_prepends() {
        let mut buffer = filled(b"world");
        buffer.unget(b"hello ".to_vec());
        assert_eq!(buffer.get(Take::all()), b"hello world");
    }

    #[test]
    fn test_find_from_offset() {
        let buffer = filled(b"abcabc");
        assert_eq!(buffer.find(b"bc", 0), Some(1));
        assert_eq!(buffer.find(b"bc", 2), Some(4));
        assert_eq!(buffer.find(b"bc", 5), None);
        assert_eq!(buffer.find(b"bc", 100), None);
    }

    #[test]
    fn test_raw_needle_from_text() {
        let buffer = RawBuffer::default();
        assert_eq!(buffer.needle(Delimiter::from("\n")).unwrap(), b"\n");
        assert_eq!(buffer.needle(Delimiter::from(b"ab")).unwrap(), b"ab");
    }

    #[test]
    fn test_offset_of() {
        let buffer = filled(b"abc");
        assert_eq!(buffer.offset_of(2), Some(2));
        assert_eq!(buffer.offset_of(3), Some(3));
        assert_eq!(buffer.offset_of(4), None);
    }

    #[test]
    fn test_line_ranges() {
        let data = b"one\ntwo\r\nthree\rfour";
        let lines: Vec<_> = line_ranges(data, false)
            .into_iter()
            .map(|r| &data[r])
            .collect();
        assert_eq!(
            lines,
            vec![&b"one"[..], &b"two"[..], &b"three"[..], &b"four"[..]]
        );

        let kept: Vec<_> = line_ranges(data, true)
            .into_iter()
            .map(|r| &data[r])
            .collect();
        assert_eq!(kept[1], b"two\r\n");
    }

    #[test]
    fn test_split_lines_trailing_newline() {
        let lines = RawBuffer::split_lines(b"a\nb\n".to_vec(), false);
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_output_buffer() {
        let mut out = OutputBuffer::default();
        assert_eq!(out.put("abc").unwrap(), 3);
        out.end_line();
        assert_eq!(out.put(&42).unwrap(), 2);
        assert_eq!(out.take(), b"abc\n42");
        assert!(out.is_empty());
    }
}
