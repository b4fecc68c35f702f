//! Read side of the stream engine.

use super::Stream;
use crate::core::buffer::empty_delimiter;
use crate::core::{Buffer, Delimiter, DelimiterMode, LINE_SEPARATOR, Payload, Take};
use crate::error::{Error, Result};
use crate::io::{Direction, Sink, Source, Transfer};
use std::time::Duration;

impl<B: Source, U: Buffer> Stream<B, U> {
    /// One underflow into the input buffer. `Data` carries the number of
    /// newly decoded units, which may be zero.
    fn pull(&mut self, wait: Option<Duration>) -> Result<Transfer> {
        let size = self.options.chunk_size.max(1);
        if self.scratch.len() != size {
            self.scratch.resize(size, 0);
        }
        match self.backend.underflow(&mut self.scratch, wait)? {
            Transfer::Data(n) => {
                let units = self.input.put(&self.scratch[..n])?;
                tracing::trace!(bytes = n, units, "underflow");
                Ok(Transfer::Data(units))
            }
            Transfer::Closed => {
                self.mark_eof()?;
                Ok(Transfer::Closed)
            }
            Transfer::Pending => Ok(Transfer::Pending),
        }
    }

    fn mark_eof(&mut self) -> Result<()> {
        if !self.eof {
            tracing::debug!(stream = %self.backend.describe(), "end of input");
            self.eof = true;
        }
        self.input.eof()
    }

    /// Blocks until new units are buffered, bounded by the active timeout
    /// scope. Returns false at end of input.
    pub(crate) fn fill(&mut self) -> Result<bool> {
        loop {
            if self.eof {
                self.input.eof()?;
                return Ok(false);
            }
            let wait = self.timeouts.remaining()?;
            match self.pull(wait)? {
                Transfer::Data(0) => {}
                Transfer::Data(_) => return Ok(true),
                Transfer::Closed => return Ok(false),
                // interrupted before anything arrived
                Transfer::Pending if wait.is_none() => {}
                Transfer::Pending => {
                    self.timeouts.note_timeout();
                    return Err(Error::Timeout {
                        context: "waiting for data",
                    });
                }
            }
        }
    }

    /// One zero-wait underflow.
    pub(crate) fn probe(&mut self) -> Result<Transfer> {
        if self.eof {
            return Ok(Transfer::Closed);
        }
        self.pull(Some(Duration::ZERO))
    }

    fn drain_ready(&mut self) -> Result<()> {
        while let Transfer::Data(_) = self.probe()? {}
        Ok(())
    }

    fn take_units(&mut self, size: usize, peek: bool) -> Result<U::Data> {
        self.ensure(Direction::Read)?;
        if size == 0 {
            return Ok(U::Data::default());
        }
        loop {
            if let Some(end) = self.input.offset_of(size) {
                let take = Take::prefix(end);
                return Ok(self.input.get(if peek { take.peek() } else { take }));
            }
            if !self.fill()? {
                return Err(Error::EndOfStream);
            }
        }
    }

    /// Reads `size` units, or everything up to end of input for `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] if input ends before `size` units
    /// arrive, or, for `None`, if nothing at all is left.
    pub fn read(&mut self, size: Option<usize>) -> Result<U::Data> {
        match size {
            Some(size) => self.read_exact(size),
            None => {
                let data = self.read_to_end()?;
                if data.as_ref().is_empty() {
                    return Err(Error::EndOfStream);
                }
                Ok(data)
            }
        }
    }

    /// Reads exactly `size` units. Zero returns at once without touching
    /// the backend.
    pub fn read_exact(&mut self, size: usize) -> Result<U::Data> {
        self.take_units(size, false)
    }

    /// Reads everything up to end of input, which may be nothing.
    pub fn read_to_end(&mut self) -> Result<U::Data> {
        self.ensure(Direction::Read)?;
        while self.fill()? {}
        Ok(self.input.get(Take::all()))
    }

    /// Like [`read_exact`](Self::read_exact) but leaves the data buffered.
    pub fn peek(&mut self, size: usize) -> Result<U::Data> {
        self.take_units(size, true)
    }

    /// Reads up to `delimiter` and drops it.
    pub fn read_until<'d>(&mut self, delimiter: impl Into<Delimiter<'d>>) -> Result<U::Data> {
        self.read_until_with(delimiter, DelimiterMode::Drop, false)
    }

    /// Reads up to `delimiter`.
    ///
    /// `mode` says whether the delimiter is returned, dropped or left in
    /// the buffer. With `last`, reaching end of input without a match
    /// returns whatever is buffered instead of failing.
    ///
    /// Each underflow rescans only the new data plus the last
    /// `delimiter.len() - 1` units before it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty delimiter and
    /// [`Error::EndOfStream`] if input ends first.
    pub fn read_until_with<'d>(
        &mut self,
        delimiter: impl Into<Delimiter<'d>>,
        mode: DelimiterMode,
        last: bool,
    ) -> Result<U::Data> {
        self.ensure(Direction::Read)?;
        let needle = self.input.needle(delimiter.into())?;
        if needle.is_empty() {
            return Err(empty_delimiter());
        }

        let mut from = 0;
        loop {
            if let Some(pos) = self.input.find(&needle, from) {
                return Ok(self.input.get(Take::delimited(pos, needle.len(), mode)));
            }
            from = self.input.len().saturating_sub(needle.len() - 1);
            if !self.fill()? {
                if last && !self.input.is_empty() {
                    return Ok(self.input.get(Take::all()));
                }
                return Err(Error::EndOfStream);
            }
        }
    }

    /// Reads one line. A final line without separator is returned as is.
    pub fn read_line(&mut self, keep: bool) -> Result<U::Data> {
        self.read_until_with(LINE_SEPARATOR, DelimiterMode::from_flags(keep, true), true)
    }

    /// Reads everything and splits it into lines (`\n`, `\r\n` or `\r`).
    pub fn read_lines(&mut self, keep: bool) -> Result<Vec<U::Data>> {
        let data = self.read(None)?;
        Ok(U::split_lines(data, keep))
    }

    /// Iterator over lines until end of input.
    pub const fn lines(&mut self, keep: bool) -> Lines<'_, B, U> {
        Lines {
            stream: self,
            keep,
            done: false,
        }
    }

    /// Skips past the next line separator.
    pub fn next_line(&mut self) -> Result<&mut Self> {
        self.read_line(false)?;
        Ok(self)
    }

    /// Skips to just before `delimiter`, leaving it buffered.
    pub fn before<'d>(&mut self, delimiter: impl Into<Delimiter<'d>>) -> Result<&mut Self> {
        self.read_until_with(delimiter, DelimiterMode::Exclude, false)?;
        Ok(self)
    }

    /// Skips past `delimiter`.
    pub fn after<'d>(&mut self, delimiter: impl Into<Delimiter<'d>>) -> Result<&mut Self> {
        self.read_until_with(delimiter, DelimiterMode::Drop, false)?;
        Ok(self)
    }

    /// Returns buffered data if there is any. Otherwise probes the backend
    /// once without waiting and, if that yields nothing, performs one
    /// blocking underflow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] only when the backend reports closure.
    pub fn read_lazy(&mut self) -> Result<U::Data> {
        self.ensure(Direction::Read)?;
        if self.input.is_empty() {
            let probed = self.probe()?;
            if self.input.is_empty() && (probed == Transfer::Closed || !self.fill()?) {
                return Err(Error::EndOfStream);
            }
        }
        Ok(self.input.get(Take::all()))
    }

    /// Drains everything available right now. If nothing is, blocks for one
    /// chunk first, then drains whatever followed it.
    pub fn read_eager(&mut self) -> Result<U::Data> {
        self.ensure(Direction::Read)?;
        self.drain_ready()?;
        if self.input.is_empty() {
            if !self.fill()? {
                return Err(Error::EndOfStream);
            }
            self.drain_ready()?;
        }
        Ok(self.input.get(Take::all()))
    }
}

impl<B: Source + Sink, U: Buffer> Stream<B, U> {
    /// Writes `prompt`, then returns the eager reply.
    pub fn input<P: Payload + ?Sized>(&mut self, prompt: &P) -> Result<U::Data> {
        self.write(prompt)?;
        self.read_eager()
    }
}

/// Lines of a stream, see [`Stream::lines`].
#[derive(Debug)]
pub struct Lines<'a, B, U: Buffer> {
    stream: &'a mut Stream<B, U>,
    keep: bool,
    done: bool,
}

impl<B: Source, U: Buffer> Iterator for Lines<'_, B, U> {
    type Item = Result<U::Data>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.read_line(self.keep) {
            Err(Error::EndOfStream) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
            Ok(line) => Some(Ok(line)),
        }
    }
}
