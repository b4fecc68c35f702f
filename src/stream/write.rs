//! Write side of the stream engine.
//!
//! Every call flushes before returning; nothing is batched across calls.

use super::Stream;
use crate::core::{Buffer, Payload};
use crate::error::{Error, Result};
use crate::io::{Direction, Sink};
use std::io;

impl<B: Sink, U: Buffer> Stream<B, U> {
    /// Hands pending output to the backend.
    pub fn flush(&mut self) -> Result<()> {
        if self.output.is_empty() {
            return Ok(());
        }
        let data = self.output.take();
        let wait = self.timeouts.remaining()?;
        tracing::trace!(bytes = data.len(), ?wait, "overflow");
        let res = self.backend.overflow(&data, wait);
        if res.as_ref().is_err_and(Error::is_timeout) {
            self.timeouts.note_timeout();
        }
        res
    }

    /// Writes `payload`.
    ///
    /// Bytes go out verbatim, text is encoded with the stream's encoding
    /// and numbers in decimal; see [`Payload`].
    pub fn write<P: Payload + ?Sized>(&mut self, payload: &P) -> Result<&mut Self> {
        self.ensure(Direction::Write)?;
        self.output.put(payload)?;
        self.flush()?;
        Ok(self)
    }

    /// Writes `payload` followed by a line separator.
    pub fn write_line<P: Payload + ?Sized>(&mut self, payload: &P) -> Result<&mut Self> {
        self.ensure(Direction::Write)?;
        self.output.put(payload)?;
        self.output.end_line();
        self.flush()?;
        Ok(self)
    }

    /// Writes each item followed by a line separator, in one flush.
    pub fn write_lines<I>(&mut self, lines: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Payload,
    {
        self.ensure(Direction::Write)?;
        for line in lines {
            self.output.put(&line)?;
            self.output.end_line();
        }
        self.flush()?;
        Ok(self)
    }

    /// Writes a bare line separator.
    pub fn end_line(&mut self) -> Result<&mut Self> {
        self.ensure(Direction::Write)?;
        self.output.end_line();
        self.flush()?;
        Ok(self)
    }
}

/// Byte-level adapter so streams can stand in wherever `std::io::Write` is expected.
impl<B: Sink, U: Buffer> io::Write for Stream<B, U> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Self::write(self, buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Self::flush(self).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{Json, RawBuffer, StreamOptions, TextBuffer, TimeoutScope, Timeoutable};
    use crate::error::Error;
    use crate::io::Direction;
    use crate::stream::Stream;
    use crate::stream::testing::Script;
    use serde_json::json;
    use std::time::Duration;

    fn stream() -> Stream<Script, TextBuffer> {
        Stream::with_backend(Script::default(), TextBuffer::default(), StreamOptions::default())
    }

    #[test]
    fn test_write_mixed_payloads() {
        let mut s = stream();
        s.write("id=").unwrap().write(&42).unwrap().write(b"\x00").unwrap();
        assert_eq!(s.backend().written, b"id=42\x00");
    }

    #[test]
    fn test_write_line_variants() {
        let mut s = stream();
        s.write_line("a").unwrap().end_line().unwrap();
        s.write_lines(["b", "c"]).unwrap();
        s.write_lines(vec![Json(json!([1, "x"]))]).unwrap();
        assert_eq!(s.backend().written, b"a\n\nb\nc\n[1,\"x\"]\n");
    }

    #[test]
    fn test_unencodable_text_leaves_nothing_pending() {
        let mut s = Stream::with_backend(
            Script::default(),
            TextBuffer::new(crate::core::Encoding::Ascii),
            StreamOptions::default(),
        );
        assert!(s.write("é").is_err());
        s.write("ok").unwrap();
        assert_eq!(s.backend().written, b"ok");
    }

    #[test]
    fn test_write_is_bounded_by_scope() {
        let mut s = stream();
        s.write("a").unwrap();
        s.with_timeout(TimeoutScope::per_call(Duration::from_millis(40)), |s| {
            s.write("b").map(|_| ())
        })
        .unwrap();
        assert_eq!(
            s.backend().write_waits,
            vec![None, Some(Duration::from_millis(40))]
        );
    }

    #[test]
    fn test_write_after_deadline_fails() {
        let mut s = stream();
        let res = s.with_timeout(TimeoutScope::total(Duration::ZERO), |s| s.write("late").map(|_| ()));
        assert!(res.unwrap_err().is_timeout());
        assert!(s.backend().written.is_empty());
    }

    #[test]
    fn test_write_after_shutdown() {
        let mut s = Stream::with_backend(Script::default(), RawBuffer::default(), StreamOptions::default());
        s.close_side(Direction::Write).unwrap();
        assert!(matches!(s.write("x"), Err(Error::Closed)));
    }

    #[test]
    fn test_std_write_adapter() {
        let mut s = stream();
        std::io::Write::write_all(&mut s, b"raw").unwrap();
        assert_eq!(s.backend().written, b"raw");
    }
}
