//! Stream tuning knobs.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default number of bytes requested from a backend per underflow.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default per-iteration timeout of pipe and interact workers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options shared by every stream constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Bytes requested per underflow.
    pub chunk_size: usize,
    /// How often forwarding workers check for cancellation.
    pub poll_interval: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl StreamOptions {
    /// Sets the chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk size must be positive".to_string(),
            });
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// Sets the forwarding poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StreamOptions::default();
        assert_eq!(options.chunk_size, 8192);
        assert_eq!(options.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = StreamOptions::default().with_chunk_size(0).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert_eq!(
            StreamOptions::default().with_chunk_size(16).unwrap().chunk_size,
            16
        );
    }
}
