//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use crate::error::Error;
use crate::stream::BridgeEnd;
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// What a `read` command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// One block of data.
    Data(String),
    /// Data split into lines.
    Lines(Vec<String>),
}

/// Formats the result of a `read` command.
#[must_use]
pub fn format_read(path: &Path, result: &ReadResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => match result {
            ReadResult::Data(data) => data.clone(),
            ReadResult::Lines(lines) => {
                let mut output = String::new();
                for line in lines {
                    let _ = writeln!(output, "{line}");
                }
                output
            }
        },
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct ReadOutput<'a> {
                path: String,
                #[serde(skip_serializing_if = "Option::is_none")]
                data: Option<&'a str>,
                #[serde(skip_serializing_if = "Option::is_none")]
                lines: Option<&'a [String]>,
            }
            let (data, lines) = match result {
                ReadResult::Data(data) => (Some(data.as_str()), None),
                ReadResult::Lines(lines) => (None, Some(lines.as_slice())),
            };
            format_json(&ReadOutput {
                path: path.to_string_lossy().to_string(),
                data,
                lines,
            })
        }
    }
}

/// Formats the result of a `write` command.
#[must_use]
pub fn format_write(path: &Path, bytes: usize, append: bool, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let verb = if append { "Appended" } else { "Wrote" };
            format!("{verb} {bytes} bytes to {}\n", path.display())
        }
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct WriteOutput {
                path: String,
                bytes: usize,
                append: bool,
            }
            format_json(&WriteOutput {
                path: path.to_string_lossy().to_string(),
                bytes,
                append,
            })
        }
    }
}

/// Formats how an interactive session ended.
#[must_use]
pub fn format_session(
    target: &str,
    end: BridgeEnd,
    returncode: Option<i32>,
    format: OutputFormat,
) -> String {
    let reason = match end {
        BridgeEnd::RemoteClosed => "remote_closed",
        BridgeEnd::LocalClosed => "local_closed",
        BridgeEnd::Interrupted => "interrupted",
    };
    match format {
        OutputFormat::Text => match returncode {
            Some(code) => format!("{target}: {reason}, exit code {code}\n"),
            None => format!("{target}: {reason}\n"),
        },
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct SessionOutput<'a> {
                target: &'a str,
                end: &'a str,
                #[serde(skip_serializing_if = "Option::is_none")]
                returncode: Option<i32>,
            }
            format_json(&SessionOutput {
                target,
                end: reason,
                returncode,
            })
        }
    }
}

/// Formats an error for the selected output format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct ErrorOutput {
                error: String,
                kind: &'static str,
            }
            let kind = match error {
                Error::EndOfStream => "end_of_stream",
                Error::Timeout { .. } => "timeout",
                Error::DecodeTruncation { .. } => "decode_truncation",
                Error::InvalidData { .. } => "invalid_data",
                Error::InvalidArgument(_) => "invalid_argument",
                Error::Unsupported { .. } => "unsupported",
                Error::Closed => "closed",
                Error::Io(_) => "io",
                Error::Command(_) => "command",
                Error::Config { .. } => "config",
            };
            format_json(&ErrorOutput {
                error: error.to_string(),
                kind,
            })
        }
    }
}

/// Formats a value as JSON.
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("unknown"), OutputFormat::Text);
    }

    #[test]
    fn test_format_read() {
        let path = Path::new("f.txt");
        let lines = ReadResult::Lines(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(format_read(path, &lines, OutputFormat::Text), "a\nb\n");

        let json = format_read(path, &ReadResult::Data("x".to_string()), OutputFormat::Json);
        assert!(json.contains("\"data\": \"x\""));
        assert!(!json.contains("lines"));
    }

    #[test]
    fn test_format_session() {
        let text = format_session("cat", BridgeEnd::RemoteClosed, Some(0), OutputFormat::Text);
        assert_eq!(text, "cat: remote_closed, exit code 0\n");

        let json = format_session("h:1", BridgeEnd::Interrupted, None, OutputFormat::Json);
        assert!(json.contains("\"end\": \"interrupted\""));
        assert!(!json.contains("returncode"));
    }

    #[test]
    fn test_format_error() {
        let json = format_error(&Error::Timeout { context: "x" }, OutputFormat::Json);
        assert!(json.contains("\"kind\": \"timeout\""));
        assert_eq!(format_error(&Error::Closed, OutputFormat::Text), "I/O operation on closed stream");
    }
}
