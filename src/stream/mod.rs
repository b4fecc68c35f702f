//! The backend-agnostic stream engine.
//!
//! [`Stream`] combines a backend with an input [`Buffer`], an
//! [`OutputBuffer`] and a [`TimeoutStack`]. Read operations live in
//! `read`, write operations in `write`; background forwarding is in
//! [`pipe`] and the terminal bridge in `interact`.

mod interact;
pub mod pipe;
mod read;
mod write;

pub use interact::BridgeEnd;
pub use pipe::{PipeHandle, PipeOutcome, StopSignal};
pub use read::Lines;

use crate::core::{Buffer, OutputBuffer, RawBuffer, StreamOptions, TimeoutStack, Timeoutable};
use crate::error::{Error, Result};
use crate::io::{Backend, Capabilities, Direction, Seekable};
use std::io::SeekFrom;
use std::os::fd::BorrowedFd;

/// Lifecycle of a stream. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    /// One side was shut down; the payload names the side still open.
    Half(Direction),
    Closed,
}

impl State {
    const fn allows(self, side: Direction) -> bool {
        match self {
            Self::Open => true,
            Self::Half(open) => matches!(
                (open, side),
                (Direction::Read, Direction::Read) | (Direction::Write, Direction::Write)
            ),
            Self::Closed => false,
        }
    }

    /// State after closing `side`.
    const fn after_closing(self, side: Direction) -> Self {
        match (self, side) {
            (Self::Closed, _) | (_, Direction::Both) => Self::Closed,
            (Self::Open, Direction::Read) => Self::Half(Direction::Write),
            (Self::Open, Direction::Write) => Self::Half(Direction::Read),
            (Self::Half(Direction::Read), Direction::Read)
            | (Self::Half(Direction::Write), Direction::Write) => Self::Closed,
            (state, _) => state,
        }
    }
}

/// Buffered stream over a backend `B`, handing out data shaped by `U`.
///
/// The buffer type decides whether reads return bytes ([`RawBuffer`]) or
/// decoded text ([`TextBuffer`](crate::TextBuffer)).
#[derive(Debug)]
pub struct Stream<B, U: Buffer = RawBuffer> {
    pub(crate) backend: B,
    pub(crate) input: U,
    pub(crate) output: OutputBuffer,
    pub(crate) timeouts: TimeoutStack,
    pub(crate) options: StreamOptions,
    pub(crate) eof: bool,
    state: State,
    scratch: Vec<u8>,
}

impl<B: Backend, U: Buffer> Stream<B, U> {
    /// Builds a stream over an existing backend.
    pub fn with_backend(backend: B, input: U, options: StreamOptions) -> Self {
        let output = OutputBuffer::new(input.encoding());
        Self {
            backend,
            input,
            output,
            timeouts: TimeoutStack::new(),
            options,
            eof: false,
            state: State::Open,
            scratch: Vec::new(),
        }
    }

    /// The backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably.
    pub const fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Options the stream was created with.
    pub const fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// What the backend supports.
    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    /// Returns true once the backend reported end of input.
    pub const fn at_eof(&self) -> bool {
        self.eof
    }

    /// Returns true once both sides are closed.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Buffered input, in units (bytes or characters).
    pub fn buffered(&self) -> usize {
        self.input.units()
    }

    /// Underlying descriptor, if the backend has one.
    pub fn fileno(&self) -> Option<BorrowedFd<'_>> {
        self.backend.fd()
    }

    /// Closes the stream. Closing again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.close_side(Direction::Both)
    }

    /// Closes one side, named by a direction key: `in`, `read` or `recv`
    /// for the receiving side, `out`, `write` or `send` for the sending
    /// side, `both` for everything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unknown key.
    pub fn shutdown(&mut self, direction: &str) -> Result<()> {
        let direction = direction.parse()?;
        self.close_side(direction)
    }

    /// Closes `side`. Closing a side twice is a no-op.
    pub fn close_side(&mut self, side: Direction) -> Result<()> {
        let next = self.state.after_closing(side);
        if next == self.state {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.state, next);
        tracing::debug!(stream = %self.backend.describe(), ?side, "closing");
        let res = self.backend.close(side);
        if previous.allows(Direction::Read) && !next.allows(Direction::Read) {
            self.input.clear();
        }
        res
    }

    pub(crate) fn ensure(&self, side: Direction) -> Result<()> {
        if !self.state.allows(side) {
            return Err(Error::Closed);
        }
        let caps = self.backend.capabilities();
        match side {
            Direction::Read if !caps.readable => Err(Error::Unsupported { operation: "read" }),
            Direction::Write if !caps.writable => Err(Error::Unsupported { operation: "write" }),
            _ => Ok(()),
        }
    }
}

impl<B: Backend, U: Buffer> Timeoutable for Stream<B, U> {
    fn timeouts(&mut self) -> &mut TimeoutStack {
        &mut self.timeouts
    }
}

impl<B: Seekable, U: Buffer> Stream<B, U> {
    /// Moves the position, discarding buffered input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the handle cannot seek.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<&mut Self> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if !self.capabilities().seekable {
            return Err(Error::Unsupported { operation: "seek" });
        }
        let target = match pos {
            SeekFrom::Current(delta) => {
                let here = self.tell()?;
                let here = i64::try_from(here).map_err(|_| Error::invalid("position overflow"))?;
                let there = here
                    .checked_add(delta)
                    .and_then(|there| u64::try_from(there).ok())
                    .ok_or_else(|| Error::invalid("seek before start of file"))?;
                SeekFrom::Start(there)
            }
            other => other,
        };
        self.input.clear();
        self.eof = false;
        let at = self.backend.seek(target)?;
        tracing::debug!(stream = %self.backend.describe(), at, "seeked");
        Ok(self)
    }

    /// Logical position: the handle's position minus buffered input.
    pub fn tell(&mut self) -> Result<u64> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let raw = self.backend.tell()?;
        let buffered = u64::try_from(self.input.raw_len()).unwrap_or(u64::MAX);
        Ok(raw.saturating_sub(buffered))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory backend for engine tests.

    use crate::error::Result;
    use crate::io::{Backend, Capabilities, Direction, Sink, Source, Transfer};
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Step {
        Data(Vec<u8>),
        Pending,
    }

    /// Replays `steps`, then reports the source as closed. `Pending` sleeps
    /// for the requested wait, like a real handle would.
    #[derive(Debug, Default)]
    pub(crate) struct Script {
        pub(crate) steps: VecDeque<Step>,
        pub(crate) calls: usize,
        pub(crate) waits: Vec<Option<Duration>>,
        pub(crate) written: Vec<u8>,
        pub(crate) write_waits: Vec<Option<Duration>>,
        pub(crate) closed: Vec<Direction>,
        /// Keep reporting `Pending` instead of closing once `steps` run out.
        pub(crate) stall: bool,
    }

    impl Script {
        pub(crate) fn chunks<I, C>(chunks: I) -> Self
        where
            I: IntoIterator<Item = C>,
            C: AsRef<[u8]>,
        {
            Self {
                steps: chunks
                    .into_iter()
                    .map(|c| Step::Data(c.as_ref().to_vec()))
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl Backend for Script {
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                readable: true,
                writable: true,
                seekable: false,
            }
        }

        fn close(&mut self, direction: Direction) -> Result<()> {
            self.closed.push(direction);
            Ok(())
        }

        fn describe(&self) -> String {
            "script".to_string()
        }
    }

    impl Source for Script {
        fn underflow(&mut self, buf: &mut [u8], wait: Option<Duration>) -> Result<Transfer> {
            self.calls += 1;
            self.waits.push(wait);
            match self.steps.pop_front() {
                Some(Step::Data(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.steps.push_front(Step::Data(data[n..].to_vec()));
                    }
                    Ok(Transfer::Data(n))
                }
                Some(Step::Pending) => {
                    std::thread::sleep(wait.unwrap_or(Duration::ZERO));
                    Ok(Transfer::Pending)
                }
                None if self.stall => {
                    std::thread::sleep(wait.unwrap_or(Duration::from_millis(1)));
                    Ok(Transfer::Pending)
                }
                None => Ok(Transfer::Closed),
            }
        }
    }

    impl Sink for Script {
        fn overflow(&mut self, data: &[u8], wait: Option<Duration>) -> Result<()> {
            self.write_waits.push(wait);
            self.written.extend_from_slice(data);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Script;
    use super::*;
    use crate::core::TextBuffer;

    #[test]
    fn test_close_idempotent() {
        let mut stream = Stream::with_backend(Script::default(), RawBuffer::default(), StreamOptions::default());
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(stream.is_closed());
        assert_eq!(stream.backend().closed, vec![Direction::Both]);
    }

    #[test]
    fn test_shutdown_one_side() {
        let mut stream = Stream::with_backend(Script::default(), TextBuffer::default(), StreamOptions::default());
        stream.shutdown("send").unwrap();
        assert!(!stream.is_closed());
        assert!(matches!(stream.ensure(Direction::Write), Err(Error::Closed)));
        assert!(stream.ensure(Direction::Read).is_ok());

        stream.shutdown("recv").unwrap();
        assert!(stream.is_closed());
        assert!(matches!(stream.shutdown("sideways"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_state_transitions() {
        let half = State::Open.after_closing(Direction::Write);
        assert_eq!(half, State::Half(Direction::Read));
        assert!(half.allows(Direction::Read));
        assert!(!half.allows(Direction::Write));

        assert_eq!(half.after_closing(Direction::Write), half);
        assert_eq!(half.after_closing(Direction::Read), State::Closed);
        assert_eq!(State::Open.after_closing(Direction::Both), State::Closed);
        assert_eq!(State::Closed.after_closing(Direction::Read), State::Closed);
    }
}
