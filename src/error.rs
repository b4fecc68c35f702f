//! Error types for unified I/O operations.
//!
//! Every stream operation reports failures through [`Error`]. The stream
//! taxonomy (end of stream, timeout, truncated decode, invalid argument,
//! unsupported operation, closed stream) lives at the top level so callers
//! can match on it directly; OS and CLI failures are nested.

use thiserror::Error;

/// Result type alias for unified I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for unified I/O operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The source closed before an exact-size or delimited request could be satisfied.
    #[error("unexpected end of stream")]
    EndOfStream,

    /// A scoped timeout or deadline elapsed before the next blocking primitive.
    #[error("timeout {context}")]
    Timeout {
        /// What the stream was doing when the bound elapsed.
        context: &'static str,
    },

    /// The source closed in the middle of a multi-byte sequence.
    #[error("truncated multi-byte sequence: {pending} undecoded bytes at end of stream")]
    DecodeTruncation {
        /// Number of raw bytes left in the decoder.
        pending: usize,
    },

    /// Malformed input for the configured encoding.
    #[error("invalid data at byte offset {offset}: {reason}")]
    InvalidData {
        /// Offset of the offending byte within the chunk being decoded.
        offset: usize,
        /// Why the byte was rejected.
        reason: String,
    },

    /// Caller supplied an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend does not provide this capability.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the missing capability.
        operation: &'static str,
    },

    /// Operation attempted after the stream (or this side of it) was closed.
    #[error("I/O operation on closed stream")]
    Closed,

    /// OS-level I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// Returns true for [`Error::EndOfStream`].
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    /// Returns true for [`Error::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// OS-specific errors, tagged with the resource involved.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to open a file.
    #[error("failed to open file: {path}: {reason}")]
    OpenFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to connect a socket.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed {
        /// `host:port` that was dialed.
        endpoint: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to spawn a child process.
    #[error("failed to spawn `{command}`: {reason}")]
    SpawnFailed {
        /// Rendered command line.
        command: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to deliver a signal to a child process.
    #[error("failed to signal process {pid}: {reason}")]
    SignalFailed {
        /// Target process id.
        pid: u32,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("{0}")]
    Generic(String),
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// Output format error.
    #[error("output format error: {0}")]
    OutputFormat(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout {
                context: "waiting for the operating system",
            },
            _ => Self::Io(IoError::Generic(err.to_string())),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::OutputFormat(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::EndOfStream.to_string(), "unexpected end of stream");
        assert_eq!(Error::Closed.to_string(), "I/O operation on closed stream");

        let err = Error::Timeout {
            context: "while receiving from socket",
        };
        assert_eq!(err.to_string(), "timeout while receiving from socket");

        let err = Error::DecodeTruncation { pending: 2 };
        assert!(err.to_string().contains("2 undecoded bytes"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(Error::EndOfStream.is_eof());
        assert!(!Error::EndOfStream.is_timeout());
        assert!(Error::Timeout { context: "x" }.is_timeout());
        assert!(!Error::Closed.is_eof());
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::Unsupported { operation: "seek" };
        assert_eq!(err.to_string(), "unsupported operation: seek");
    }

    #[test]
    fn test_io_error_variants() {
        let err = IoError::FileNotFound {
            path: "/tmp/missing".to_string(),
        };
        assert_eq!(err.to_string(), "file not found: /tmp/missing");

        let err = IoError::ConnectFailed {
            endpoint: "localhost:1".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("localhost:1"));
        assert!(err.to_string().contains("connection refused"));

        let err = IoError::SpawnFailed {
            command: "nope".to_string(),
            reason: "not found".to_string(),
        };
        assert!(err.to_string().contains("`nope`"));

        let err = IoError::SignalFailed {
            pid: 42,
            reason: "no such process".to_string(),
        };
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_error_from_io_timeout() {
        let io_err = std::io::Error::new(std::io::ErrorKind::WouldBlock, "again");
        let err: Error = io_err.into();
        assert!(err.is_timeout());

        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let err: Error = io_err.into();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_error_from_io_generic() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(IoError::Generic(_))));
    }

    #[test]
    fn test_error_from_command() {
        let cmd_err = CommandError::InvalidArgument("--port".to_string());
        let err: Error = cmd_err.into();
        assert!(matches!(err, Error::Command(_)));
        assert!(err.to_string().contains("--port"));
    }

    #[test]
    fn test_from_serde_json_error_to_command_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: CommandError = json_err.into();
        assert!(matches!(err, CommandError::OutputFormat(_)));
    }

    #[test]
    fn test_error_config() {
        let err = Error::Config {
            message: "bad encoding".to_string(),
        };
        assert_eq!(err.to_string(), "configuration error: bad encoding");
    }
}
