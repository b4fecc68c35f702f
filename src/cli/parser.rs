//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use crate::core::{DEFAULT_CHUNK_SIZE, Encoding, StreamOptions, TimeoutScope};
use crate::error::{Error, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// UIO: unified stream I/O over files, sockets and processes.
///
/// Connects to a TCP endpoint or spawns a process and bridges it with the
/// terminal, or reads and writes files with delimiter and line handling.
#[derive(Parser, Debug)]
#[command(name = "uio")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Per-operation timeout in seconds. Negative means no timeout.
    #[arg(short, long, env = "UIO_TIMEOUT", global = true, allow_negative_numbers = true)]
    pub timeout: Option<f64>,

    /// Text encoding (utf-8, latin-1, ascii).
    #[arg(short, long, env = "UIO_ENCODING", default_value = "utf-8", global = true)]
    pub encoding: String,

    /// Treat data as raw bytes instead of decoded text.
    #[arg(long, global = true)]
    pub raw: bool,

    /// Read chunk size in bytes.
    #[arg(long, env = "UIO_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE, global = true)]
    pub chunk_size: usize,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a TCP endpoint and switch to interactive mode.
    Connect {
        /// Host name or address.
        host: String,

        /// Port number.
        port: u16,
    },

    /// Spawn a process and switch to interactive mode.
    Spawn {
        /// Program and arguments.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,

        /// Run the arguments as one shell command line.
        #[arg(short, long)]
        shell: bool,
    },

    /// Read from a file.
    Read {
        /// Path to the file.
        file: PathBuf,

        /// Stop at this delimiter (not included).
        #[arg(short, long, conflicts_with = "bytes")]
        until: Option<String>,

        /// Read exactly this many units (bytes, or characters for text).
        #[arg(short, long)]
        bytes: Option<usize>,

        /// Split the result into lines.
        #[arg(short, long)]
        lines: bool,

        /// Only keep lines matching this regex (implies --lines).
        #[arg(short, long)]
        grep: Option<String>,

        /// Case-insensitive --grep.
        #[arg(short, long, requires = "grep")]
        ignore_case: bool,
    },

    /// Write to a file.
    Write {
        /// Path to the file.
        file: PathBuf,

        /// Data to write.
        data: String,

        /// Append a line separator.
        #[arg(short, long)]
        line: bool,

        /// Append instead of truncating.
        #[arg(short, long)]
        append: bool,

        /// Decode `\xHH`, `\\`, `\0` and `\#expr#` escapes in the data first.
        #[arg(short = 'x', long)]
        escapes: bool,
    },
}

impl Cli {
    /// Parses the `--encoding` flag.
    pub fn encoding(&self) -> Result<Encoding> {
        self.encoding.parse().map_err(|_| Error::Config {
            message: format!("unknown encoding: {}", self.encoding),
        })
    }

    /// Stream options from the global flags.
    pub fn options(&self) -> Result<StreamOptions> {
        StreamOptions::default().with_chunk_size(self.chunk_size)
    }

    /// Timeout scope from `--timeout`, bounding each blocking call.
    pub fn timeout_scope(&self) -> Result<TimeoutScope> {
        TimeoutScope::from_secs(self.timeout, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "uio", "read", "f.txt", "--timeout", "1.5", "--encoding", "latin1", "--raw",
        ])
        .unwrap();
        assert_eq!(cli.timeout, Some(1.5));
        assert_eq!(cli.encoding().unwrap(), Encoding::Latin1);
        assert!(cli.raw);
        assert_eq!(
            cli.timeout_scope().unwrap().timeout,
            Some(std::time::Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_spawn_keeps_trailing_flags() {
        let cli = Cli::try_parse_from(["uio", "spawn", "ls", "-l", "/tmp"]).unwrap();
        match cli.command {
            Commands::Spawn { command, shell } => {
                assert_eq!(command, ["ls", "-l", "/tmp"]);
                assert!(!shell);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_settings() {
        let cli = Cli::try_parse_from(["uio", "--encoding", "ebcdic", "connect", "h", "1"]).unwrap();
        assert!(matches!(cli.encoding(), Err(Error::Config { .. })));

        let cli = Cli::try_parse_from(["uio", "--chunk-size", "0", "connect", "h", "1"]).unwrap();
        assert!(matches!(cli.options(), Err(Error::Config { .. })));

        assert!(Cli::try_parse_from(["uio", "read", "f", "--until", "x", "--bytes", "2"]).is_err());
    }
}
