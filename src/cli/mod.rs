//! CLI layer for UIO.
//!
//! Provides the command-line interface using clap, with commands for
//! bridging sockets and processes with the terminal and for one-shot
//! file reads and writes.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
