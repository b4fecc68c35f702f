//! Backend adapters for unified streams.
//!
//! A backend supplies the primitive operations a [`Stream`](crate::Stream)
//! is built on: underflow (fetch one chunk of raw input), overflow (deliver
//! pending output), close and, where the handle allows it, seek. Which
//! operations exist is decided by the traits an adapter implements and, for
//! things only known once a handle is open, by its [`Capabilities`].

pub mod duplex;
pub mod file;
pub mod process;
pub mod socket;
pub(crate) mod sys;

pub use duplex::DuplexBackend;
pub use file::{FileBackend, OpenMode};
pub use process::{CommandLine, ProcessBackend};
pub use socket::SocketBackend;

use crate::error::{Error, Result};
use std::fmt;
use std::io::{SeekFrom, Write};
use std::os::fd::BorrowedFd;
use std::str::FromStr;
use std::time::Duration;

/// Outcome of a single transfer attempt.
///
/// "Nothing yet" is an ordinary answer here, not an error, so polling loops
/// can tell it apart from a closed source without unwinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// This many bytes were transferred.
    Data(usize),
    /// The wait elapsed before the handle became ready.
    Pending,
    /// The other end closed.
    Closed,
}

/// Operations a backend supports, fixed when the backend is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Underflow is available.
    pub readable: bool,
    /// Overflow is available.
    pub writable: bool,
    /// Seek and tell are available.
    pub seekable: bool,
}

/// One side of a duplex handle, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The side data is received from.
    Read,
    /// The side data is sent to.
    Write,
    /// Both sides.
    Both,
}

impl Direction {
    /// Returns true if closing `self` closes the read side.
    #[must_use]
    pub const fn covers_read(self) -> bool {
        matches!(self, Self::Read | Self::Both)
    }

    /// Returns true if closing `self` closes the write side.
    #[must_use]
    pub const fn covers_write(self) -> bool {
        matches!(self, Self::Write | Self::Both)
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" | "read" | "recv" => Ok(Self::Read),
            "out" | "write" | "send" => Ok(Self::Write),
            "both" => Ok(Self::Both),
            other => Err(Error::invalid(format!(
                "unknown direction {other:?}, expected one of in, read, recv, out, write, send, both"
            ))),
        }
    }
}

/// Operations every backend provides.
pub trait Backend: Send + fmt::Debug {
    /// What this backend can do.
    fn capabilities(&self) -> Capabilities;

    /// Releases the OS handles for `direction`. Closing a side twice is a no-op.
    fn close(&mut self, direction: Direction) -> Result<()>;

    /// Human readable name used in log events.
    fn describe(&self) -> String;

    /// Underlying descriptor used for readiness checks, if any.
    fn fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}

/// Backends that produce input.
pub trait Source: Backend {
    /// Reads at most one chunk into `buf`, waiting up to `wait` for data.
    ///
    /// `None` waits forever. `Some(Duration::ZERO)` is a non-blocking probe.
    fn underflow(&mut self, buf: &mut [u8], wait: Option<Duration>) -> Result<Transfer>;

    /// Non-blocking underflow.
    fn underflow_nb(&mut self, buf: &mut [u8]) -> Result<Transfer> {
        self.underflow(buf, Some(Duration::ZERO))
    }
}

/// Backends that accept output.
pub trait Sink: Backend {
    /// Delivers all of `data`, or fails.
    ///
    /// `wait` bounds a blocked write where the handle supports a send
    /// timeout; files and pipes write without one.
    fn overflow(&mut self, data: &[u8], wait: Option<Duration>) -> Result<()>;

    /// A second, independently owned writer to the same destination.
    ///
    /// Used by forwarding workers so they never share the stream's buffers.
    fn writer(&self) -> Result<Box<dyn Write + Send>> {
        Err(Error::Unsupported {
            operation: "duplicate writer",
        })
    }
}

/// Backends with a movable position.
pub trait Seekable: Backend {
    /// Moves the position, returning the new absolute offset.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Current absolute position of the OS handle.
    fn tell(&mut self) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("in", Direction::Read)]
    #[test_case("read", Direction::Read)]
    #[test_case("recv", Direction::Read)]
    #[test_case("out", Direction::Write)]
    #[test_case("write", Direction::Write)]
    #[test_case("send", Direction::Write)]
    #[test_case("both", Direction::Both)]
    fn test_direction_keys(key: &str, expected: Direction) {
        assert_eq!(key.parse::<Direction>().unwrap(), expected);
    }

    #[test_case("stdin")]
    #[test_case("")]
    #[test_case("READ")]
    fn test_unknown_direction(key: &str) {
        let err = key.parse::<Direction>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_direction_coverage() {
        assert!(Direction::Both.covers_read() && Direction::Both.covers_write());
        assert!(!Direction::Read.covers_write());
        assert!(!Direction::Write.covers_read());
    }
}
