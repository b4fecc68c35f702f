//! Values accepted by stream writes.
//!
//! Raw bytes are written verbatim, text is encoded with the stream's
//! encoding and everything else is written in its display form. Structured
//! values go through [`Json`].

use crate::core::encoding::Encoding;
use crate::error::{CommandError, Result};
use serde::Serialize;

/// A value that can be serialized onto a stream.
pub trait Payload {
    /// Appends the serialized form of `self` to `out`.
    fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()>;

    /// Serialized form of `self` as a fresh byte vector.
    fn to_bytes(&self, encoding: Encoding) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(encoding, &mut out)?;
        Ok(out)
    }
}

impl<P: Payload + ?Sized> Payload for &P {
    fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        (**self).encode_into(encoding, out)
    }
}

impl Payload for [u8] {
    fn encode_into(&self, _encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> Payload for [u8; N] {
    fn encode_into(&self, _encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self);
        Ok(())
    }
}

impl Payload for Vec<u8> {
    fn encode_into(&self, _encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self);
        Ok(())
    }
}

impl Payload for str {
    fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&encoding.encode(self)?);
        Ok(())
    }
}

impl Payload for String {
    fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        self.as_str().encode_into(encoding, out)
    }
}

impl Payload for char {
    fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        let mut buf = [0u8; 4];
        self.encode_utf8(&mut buf).encode_into(encoding, out)
    }
}

macro_rules! display_payload {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Payload for $ty {
                fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
                    self.to_string().encode_into(encoding, out)
                }
            }
        )*
    };
}

display_payload!(
    i8, i16, i32, i64, i128, isize, u16, u32, u64, u128, usize, f32, f64, bool,
);

/// `u8` is written as a number, like the other integers.
impl Payload for u8 {
    fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        self.to_string().encode_into(encoding, out)
    }
}

impl Payload for serde_json::Value {
    fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::String(text) => text.encode_into(encoding, out),
            other => other.to_string().encode_into(encoding, out),
        }
    }
}

/// Writes any serializable value as compact JSON.
///
/// # Examples
///
/// ```
/// use unified_io::core::{Encoding, Json, Payload};
///
/// let bytes = Json(vec![1, 2, 3]).to_bytes(Encoding::Utf8).unwrap();
/// assert_eq!(bytes, b"[1,2,3]");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> Payload for Json<T> {
    fn encode_into(&self, encoding: Encoding, out: &mut Vec<u8>) -> Result<()> {
        let text = serde_json::to_string(&self.0).map_err(CommandError::from)?;
        text.encode_into(encoding, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utf8<P: Payload + ?Sized>(payload: &P) -> Vec<u8> {
        payload.to_bytes(Encoding::Utf8).unwrap()
    }

    #[test]
    fn test_bytes_verbatim() {
        assert_eq!(utf8(&b"\x00\xff"[..]), b"\x00\xff");
        assert_eq!(utf8(b"ab"), b"ab");
        assert_eq!(utf8(&vec![1u8, 2]), vec![1, 2]);
    }

    #[test]
    fn test_text_uses_encoding() {
        assert_eq!(utf8("é"), "é".as_bytes());
        assert_eq!("é".to_bytes(Encoding::Latin1).unwrap(), vec![0xe9]);
        assert!("é".to_bytes(Encoding::Ascii).is_err());
        assert_eq!(utf8(&'x'), b"x");
    }

    #[test]
    fn test_numbers_as_text() {
        assert_eq!(utf8(&1337), b"1337");
        assert_eq!(utf8(&-5i64), b"-5");
        assert_eq!(utf8(&7u8), b"7");
        assert_eq!(utf8(&true), b"true");
    }

    #[test]
    fn test_json_values() {
        assert_eq!(utf8(&Json(["a", "b"])), br#"["a","b"]"#);
        assert_eq!(utf8(&json!([1, "two", null])), br#"[1,"two",null]"#);
        assert_eq!(utf8(&json!("plain")), b"plain");
    }
}
