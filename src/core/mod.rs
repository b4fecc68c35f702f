//! Core building blocks for unified streams.
//!
//! Buffers, encodings, write payloads and timeout scopes. Nothing in here
//! touches the operating system; backends live in [`crate::io`].

pub mod buffer;
pub mod encoding;
pub mod options;
pub mod payload;
pub mod text;
pub mod timeout;

pub use buffer::{Buffer, Delimiter, DelimiterMode, LINE_SEPARATOR, OutputBuffer, RawBuffer, Take};
pub use encoding::{Decoder, Encoding};
pub use options::{DEFAULT_CHUNK_SIZE, DEFAULT_POLL_INTERVAL, StreamOptions};
pub use payload::{Json, Payload};
pub use text::TextBuffer;
pub use timeout::{TimeoutGuard, TimeoutScope, TimeoutStack, Timeoutable};
