//! Codecs for the interactive terminal.
//!
//! - [`escape`]: renders raw bytes for display and decodes typed escapes
//! - [`expr`]: the small pack-expression language behind `\#expr#`

pub mod escape;
pub mod expr;

pub use escape::{EscapeBuffer, EscapeDecoder, encode};
