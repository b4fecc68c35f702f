//! TCP socket backend.

use crate::core::{Buffer, Encoding, StreamOptions};
use crate::error::{Error, IoError, Result};
use crate::io::{Backend, Capabilities, Direction, Sink, Source, Transfer, sys};
use crate::stream::Stream;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

const MIN_SEND_WAIT: Duration = Duration::from_millis(1);

/// Connected TCP socket.
#[derive(Debug)]
pub struct SocketBackend {
    socket: TcpStream,
    endpoint: String,
    read_open: bool,
    write_open: bool,
}

impl SocketBackend {
    /// Connects to `host:port`, trying every resolved address in turn.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::ConnectFailed`] if no address accepts the connection.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = format!("{host}:{port}");
        let failed = |reason: String| IoError::ConnectFailed {
            endpoint: endpoint.clone(),
            reason,
        };

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| failed(e.to_string()))?;
        let mut last = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(socket) => return Ok(Self::from_stream(socket, endpoint)),
                Err(err) => last = Some(err),
            }
        }
        let reason = last.map_or_else(|| "no addresses resolved".to_string(), |e| e.to_string());
        Err(failed(reason).into())
    }

    /// Wraps an already connected socket, e.g. one returned by `accept`.
    #[must_use]
    pub fn from_stream(socket: TcpStream, endpoint: impl Into<String>) -> Self {
        Self {
            socket,
            endpoint: endpoint.into(),
            read_open: true,
            write_open: true,
        }
    }

    /// `host:port` this socket was connected to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Backend for SocketBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            writable: true,
            seekable: false,
        }
    }

    fn close(&mut self, direction: Direction) -> Result<()> {
        let read = direction.covers_read() && self.read_open;
        let write = direction.covers_write() && self.write_open;
        let how = match (read, write) {
            (true, true) => Shutdown::Both,
            (true, false) => Shutdown::Read,
            (false, true) => Shutdown::Write,
            (false, false) => return Ok(()),
        };
        self.read_open &= !read;
        self.write_open &= !write;
        match self.socket.shutdown(how) {
            // the peer may already have torn the connection down
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Error::from),
        }
    }

    fn describe(&self) -> String {
        format!("socket {}", self.endpoint)
    }

    fn fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.socket.as_fd())
    }
}

impl Source for SocketBackend {
    fn underflow(&mut self, buf: &mut [u8], wait: Option<Duration>) -> Result<Transfer> {
        if wait == Some(Duration::ZERO) {
            return sys::read_ready(&self.socket, buf, wait);
        }
        self.socket.set_read_timeout(wait)?;
        loop {
            match self.socket.read(buf) {
                Ok(0) => return Ok(Transfer::Closed),
                Ok(n) => return Ok(Transfer::Data(n)),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(Transfer::Pending);
                }
                Err(err) if err.kind() == io::ErrorKind::ConnectionReset => {
                    return Ok(Transfer::Closed);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Sink for SocketBackend {
    fn overflow(&mut self, data: &[u8], wait: Option<Duration>) -> Result<()> {
        if !self.write_open {
            return Err(Error::Closed);
        }
        // SO_SNDTIMEO rejects zero
        self.socket
            .set_write_timeout(wait.map(|w| w.max(MIN_SEND_WAIT)))?;
        let res = self.socket.write_all(data);
        self.socket.set_write_timeout(None)?;
        Ok(res?)
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.socket.try_clone()?))
    }
}

impl<U: Buffer> Stream<SocketBackend, U> {
    /// Connects to `host:port` with the default encoding and options.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use unified_io::{SocketStream, TextBuffer};
    ///
    /// let mut conn = SocketStream::<TextBuffer>::connect("localhost", 1337).unwrap();
    /// conn.after("name: ").unwrap().write_line("guest").unwrap();
    /// ```
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with(host, port, Encoding::default(), StreamOptions::default())
    }

    /// Connects with explicit encoding and options.
    ///
    /// The connection attempt itself is unbounded; use
    /// [`SocketBackend::connect`] and [`Stream::with_backend`] for a bounded connect.
    pub fn connect_with(
        host: &str,
        port: u16,
        encoding: Encoding,
        options: StreamOptions,
    ) -> Result<Self> {
        let backend = SocketBackend::connect(host, port, None)?;
        tracing::debug!(endpoint = backend.endpoint(), %encoding, "connected");
        Ok(Self::with_backend(backend, U::with_encoding(encoding), options))
    }

    /// Wraps an accepted socket.
    #[must_use]
    pub fn from_tcp(socket: TcpStream, encoding: Encoding, options: StreamOptions) -> Self {
        let endpoint = socket
            .peer_addr()
            .map_or_else(|_| "unknown peer".to_string(), |addr| addr.to_string());
        Self::with_backend(
            SocketBackend::from_stream(socket, endpoint),
            U::with_encoding(encoding),
            options,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_underflow_pending_then_data() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut backend = SocketBackend::connect("127.0.0.1", port, None).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(backend.underflow_nb(&mut buf).unwrap(), Transfer::Pending);
        assert_eq!(
            backend
                .underflow(&mut buf, Some(Duration::from_millis(20)))
                .unwrap(),
            Transfer::Pending
        );

        peer.write_all(b"hi").unwrap();
        assert_eq!(backend.underflow(&mut buf, None).unwrap(), Transfer::Data(2));

        drop(peer);
        assert_eq!(backend.underflow(&mut buf, None).unwrap(), Transfer::Closed);
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = SocketBackend::connect("127.0.0.1", port, None).unwrap_err();
        assert!(matches!(err, Error::Io(IoError::ConnectFailed { .. })));
    }

    #[test]
    fn test_close_twice() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut backend = SocketBackend::connect("127.0.0.1", port, None).unwrap();
        backend.close(Direction::Write).unwrap();
        assert!(matches!(backend.overflow(b"x", None), Err(Error::Closed)));
        backend.close(Direction::Both).unwrap();
        backend.close(Direction::Both).unwrap();
    }
}
