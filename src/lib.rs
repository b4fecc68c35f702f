//! # unified-io
//!
//! Unified buffered stream I/O over files, TCP sockets and child processes.
//!
//! Every endpoint is a [`Stream`]: a backend that moves raw bytes, an input
//! [`Buffer`] that decides whether reads hand out bytes or decoded text, and
//! a stack of timeout scopes consulted before each blocking call.
//!
//! ## Features
//!
//! - **Exact and delimited reads**: `read_exact`, `read_until`, lines, lazy and eager reads
//! - **Scoped timeouts**: per-call and total bounds that nest, see [`Timeoutable`]
//! - **Incremental text decoding**: truncated multi-byte input is held back, never split
//! - **Processes**: independent pipe shutdown, `wait`/`kill`/`signal` with exit codes
//! - **Interactive bridge**: forward a stream to the terminal and back, with byte escapes
//!
//! ```no_run
//! use std::time::Duration;
//! use unified_io::{SocketStream, TextBuffer, TimeoutScope, Timeoutable};
//!
//! let mut conn = SocketStream::<TextBuffer>::connect("localhost", 1337).unwrap();
//! conn.after("name? ").unwrap().write_line("guest").unwrap();
//! let reply = conn
//!     .with_timeout(TimeoutScope::total(Duration::from_secs(2)), |c| c.read_line(false))
//!     .unwrap();
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for poll(2), kill(2) and signal(2) in `io::sys`
#![warn(unsafe_code)]

pub mod cli;
pub mod codec;
pub mod core;
pub mod error;
pub mod io;
pub mod shortcuts;
pub mod stream;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{
    Buffer, Delimiter, DelimiterMode, Encoding, Json, Payload, RawBuffer, StreamOptions,
    TextBuffer, TimeoutGuard, TimeoutScope, Timeoutable,
};

// Re-export backends
pub use io::{
    Backend, CommandLine, Direction, DuplexBackend, FileBackend, ProcessBackend, Sink,
    SocketBackend, Source,
};

// Re-export the stream engine
pub use stream::{BridgeEnd, Lines, PipeHandle, PipeOutcome, StopSignal, Stream};

// Re-export codec types
pub use codec::EscapeBuffer;

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};

/// A stream over a file.
pub type FileStream<U = RawBuffer> = Stream<FileBackend, U>;

/// A stream over a TCP connection.
pub type SocketStream<U = RawBuffer> = Stream<SocketBackend, U>;

/// A stream over a child process's stdin and stdout.
pub type ProcessStream<U = RawBuffer> = Stream<ProcessBackend, U>;

/// A stream over this process's stdin and stdout, decoding typed escapes.
pub type TerminalStream = Stream<DuplexBackend, EscapeBuffer>;
