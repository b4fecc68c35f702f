//! Decoded text buffer.

use crate::core::buffer::{Buffer, Delimiter, Take, line_ranges};
use crate::core::encoding::{Decoder, Encoding};
use crate::error::{Error, Result};

/// Buffer of decoded text, fed through an incremental [`Decoder`].
///
/// Lengths are counted in characters; the character count is maintained on
/// every mutation so exact-length reads do not rescan the buffer.
///
/// # Examples
///
/// ```
/// use unified_io::core::{Buffer, Take, TextBuffer};
///
/// let mut buffer = TextBuffer::default();
/// assert_eq!(buffer.put(&[0xc3]).unwrap(), 0); // half of 'é'
/// assert_eq!(buffer.put(&[0xa9, b'!']).unwrap(), 2);
/// assert_eq!(buffer.get(Take::all()), "é!");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    text: String,
    chars: usize,
    decoder: Decoder,
    encoding: Encoding,
}

impl TextBuffer {
    /// Creates an empty text buffer decoding with `encoding`.
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            decoder: Decoder::new(encoding),
            encoding,
        }
    }

    /// Bytes received but not yet decoded.
    #[must_use]
    pub fn undecoded(&self) -> &[u8] {
        self.decoder.pending()
    }
}

impl Buffer for TextBuffer {
    type Data = String;

    const BINARY: bool = false;

    fn with_encoding(encoding: Encoding) -> Self {
        Self::new(encoding)
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn put(&mut self, raw: &[u8]) -> Result<usize> {
        let added = self.decoder.decode(raw, &mut self.text)?;
        self.chars += added;
        Ok(added)
    }

    fn get(&mut self, take: Take) -> String {
        let (left, right) = take.bounds(self.text.len());
        let res = self.text[..left].to_string();
        if !take.is_peek() {
            let removed = self.text.drain(..right).count();
            self.chars -= removed;
        }
        res
    }

    fn unget(&mut self, data: String) {
        self.chars += data.chars().count();
        self.text.insert_str(0, &data);
    }

    fn eof(&mut self) -> Result<()> {
        self.decoder.finish()
    }

    fn clear(&mut self) {
        self.text.clear();
        self.chars = 0;
        self.decoder.reset();
    }

    fn units(&self) -> usize {
        self.chars
    }

    fn storage(&self) -> &[u8] {
        self.text.as_bytes()
    }

    fn offset_of(&self, units: usize) -> Option<usize> {
        if units > self.chars {
            return None;
        }
        if units == self.chars {
            return Some(self.text.len());
        }
        self.text.char_indices().nth(units).map(|(offset, _)| offset)
    }

    fn raw_len(&self) -> usize {
        let encoded = self
            .encoding
            .encode(&self.text)
            .map_or(self.text.len(), |bytes| bytes.len());
        encoded + self.decoder.pending().len()
    }

    fn needle(&self, delimiter: Delimiter<'_>) -> Result<Vec<u8>> {
        match delimiter {
            Delimiter::Text(text) => Ok(text.as_bytes().to_vec()),
            Delimiter::Bytes(bytes) => self
                .encoding
                .decode(bytes)
                .map(String::into_bytes)
                .map_err(|_| {
                    Error::invalid(format!(
                        "delimiter {bytes:?} is not valid {}",
                        self.encoding
                    ))
                }),
        }
    }

    fn split_lines(data: String, keep: bool) -> Vec<String> {
        line_ranges(data.as_bytes(), keep)
            .into_iter()
            .map(|range| data[range].to_string())
            .collect()
    }
}
