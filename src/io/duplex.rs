//! Duplex backend: separate handles for input and output.

use crate::core::{Buffer, Encoding, StreamOptions};
use crate::error::{Error, Result};
use crate::io::{Backend, Capabilities, Direction, Sink, Source, Transfer, sys};
use crate::stream::Stream;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::time::Duration;

/// A pair of pipe-like handles, either of which may be closed on its own.
#[derive(Debug)]
pub struct DuplexBackend {
    input: Option<File>,
    output: Option<File>,
    name: String,
}

impl DuplexBackend {
    /// Builds a duplex backend reading from `input` and writing to `output`.
    pub fn new(
        input: Option<impl Into<OwnedFd>>,
        output: Option<impl Into<OwnedFd>>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            input: input.map(|fd| File::from(fd.into())),
            output: output.map(|fd| File::from(fd.into())),
            name: name.into(),
        }
    }

    /// Duplicates this process's standard input and output.
    ///
    /// The duplicates are unbuffered, so nothing is held back in std's
    /// stdin buffer between polls.
    pub fn stdio() -> Result<Self> {
        let input = io::stdin().as_fd().try_clone_to_owned()?;
        let output = io::stdout().as_fd().try_clone_to_owned()?;
        Ok(Self::new(Some(input), Some(output), "stdio"))
    }

    /// Returns true while the input side is open.
    #[must_use]
    pub const fn input_open(&self) -> bool {
        self.input.is_some()
    }

    /// Returns true while the output side is open.
    #[must_use]
    pub const fn output_open(&self) -> bool {
        self.output.is_some()
    }
}

impl Backend for DuplexBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            writable: true,
            seekable: false,
        }
    }

    fn close(&mut self, direction: Direction) -> Result<()> {
        if direction.covers_read() {
            self.input = None;
        }
        if direction.covers_write() {
            if let Some(mut output) = self.output.take() {
                output.flush()?;
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.input.as_ref().map(AsFd::as_fd)
    }
}

impl Source for DuplexBackend {
    fn underflow(&mut self, buf: &mut [u8], wait: Option<Duration>) -> Result<Transfer> {
        let input = self.input.as_ref().ok_or(Error::Closed)?;
        sys::read_ready(input, buf, wait)
    }
}

impl Sink for DuplexBackend {
    fn overflow(&mut self, data: &[u8], _wait: Option<Duration>) -> Result<()> {
        let output = self.output.as_mut().ok_or(Error::Closed)?;
        match output.write_all(data).and_then(|()| output.flush()) {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Err(Error::Closed),
            other => other.map_err(Error::from),
        }
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>> {
        let output = self.output.as_ref().ok_or(Error::Closed)?;
        Ok(Box::new(output.try_clone()?))
    }
}

impl<U: Buffer> Stream<DuplexBackend, U> {
    /// Stream over this process's standard input and output.
    pub fn stdio(encoding: Encoding, options: StreamOptions) -> Result<Self> {
        Ok(Self::with_backend(
            DuplexBackend::stdio()?,
            U::with_encoding(encoding),
            options,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_independent_sides() {
        let (ours_in, mut theirs_in) = UnixStream::pair().unwrap();
        let (ours_out, mut theirs_out) = UnixStream::pair().unwrap();
        let mut duplex = DuplexBackend::new(Some(ours_in), Some(ours_out), "pair");

        duplex.overflow(b"out", None).unwrap();
        let mut got = [0u8; 3];
        theirs_out.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"out");

        theirs_in.write_all(b"in").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(duplex.underflow(&mut buf, None).unwrap(), Transfer::Data(2));

        duplex.close(Direction::Write).unwrap();
        assert!(!duplex.output_open());
        assert!(duplex.input_open());
        assert!(matches!(duplex.overflow(b"x", None), Err(Error::Closed)));

        drop(theirs_in);
        assert_eq!(duplex.underflow(&mut buf, None).unwrap(), Transfer::Closed);
    }
}
