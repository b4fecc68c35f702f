//! CLI command implementations.
//!
//! Contains the logic behind each CLI command.

use crate::cli::output::{
    OutputFormat, ReadResult, format_read, format_session, format_write,
};
use crate::cli::parser::{Cli, Commands};
use crate::codec::{EscapeDecoder, escape};
use crate::core::{Buffer, Encoding, RawBuffer, StreamOptions, TextBuffer, TimeoutScope, Timeoutable};
use crate::error::{CommandError, Result};
use crate::io::{CommandLine, FileBackend, ProcessBackend, SocketBackend};
use crate::stream::Stream;
use regex::RegexBuilder;
use std::path::Path;
use std::time::Duration;

/// How long `spawn` waits for the process to exit once the session ends.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let encoding = cli.encoding()?;
    let options = cli.options()?;
    let scope = cli.timeout_scope()?;

    match &cli.command {
        Commands::Connect { host, port } => cmd_connect(host, *port, encoding, options, scope, format),
        Commands::Spawn { command, shell } => {
            cmd_spawn(command, *shell, encoding, options, scope, format)
        }
        Commands::Read {
            file,
            until,
            bytes,
            lines,
            grep,
            ignore_case,
        } => {
            let request = ReadRequest {
                until: until.as_deref(),
                bytes: *bytes,
                lines: *lines || grep.is_some(),
            };
            let mut result = if cli.raw {
                read_file::<RawBuffer>(file, &request, encoding, options, scope)?
            } else {
                read_file::<TextBuffer>(file, &request, encoding, options, scope)?
            };
            if let Some(pattern) = grep {
                result = filter_lines(result, pattern, *ignore_case)?;
            }
            Ok(format_read(file, &result, format))
        }
        Commands::Write {
            file,
            data,
            line,
            append,
            escapes,
        } => cmd_write(file, data, *line, *append, *escapes, encoding, options, format),
    }
}

fn cmd_connect(
    host: &str,
    port: u16,
    encoding: Encoding,
    options: StreamOptions,
    scope: TimeoutScope,
    format: OutputFormat,
) -> Result<String> {
    let backend = SocketBackend::connect(host, port, scope.timeout)?;
    let target = backend.endpoint().to_string();
    let mut stream: Stream<SocketBackend> =
        Stream::with_backend(backend, RawBuffer::new(encoding), options);
    let end = stream.interact()?;
    stream.close()?;
    Ok(format_session(&target, end, None, format))
}

fn cmd_spawn(
    argv: &[String],
    shell: bool,
    encoding: Encoding,
    options: StreamOptions,
    scope: TimeoutScope,
    format: OutputFormat,
) -> Result<String> {
    let command = if shell {
        CommandLine::Shell(argv.join(" "))
    } else {
        CommandLine::argv(argv)
    };
    let target = command.to_string();
    let mut process: Stream<ProcessBackend> = Stream::spawn_with(command, encoding, options)?;
    let end = process.interact()?;
    process.close()?;
    let grace = TimeoutScope::total(scope.timeout.unwrap_or(EXIT_GRACE));
    let returncode = process.with_timeout(grace, |p| match p.wait() {
        Ok(code) => Ok(Some(code)),
        Err(err) if err.is_timeout() => Ok(None),
        Err(err) => Err(err),
    })?;
    Ok(format_session(&target, end, returncode, format))
}

struct ReadRequest<'a> {
    until: Option<&'a str>,
    bytes: Option<usize>,
    lines: bool,
}

fn render<U: Buffer>(data: &U::Data) -> String {
    if U::BINARY {
        escape::encode(data.as_ref())
    } else {
        String::from_utf8_lossy(data.as_ref()).into_owned()
    }
}

fn read_file<U: Buffer>(
    path: &Path,
    request: &ReadRequest<'_>,
    encoding: Encoding,
    options: StreamOptions,
    scope: TimeoutScope,
) -> Result<ReadResult> {
    let mode = if U::BINARY { "rb" } else { "r" };
    let mut file = Stream::<FileBackend, U>::open_with(path, mode, encoding, options)?;
    let data = file.with_timeout(scope, |f| match (request.until, request.bytes) {
        (Some(delimiter), _) => f.read_until(delimiter),
        (None, Some(size)) => f.read_exact(size),
        (None, None) => f.read_to_end(),
    })?;
    file.close()?;

    if request.lines {
        let lines = U::split_lines(data, false).iter().map(render::<U>).collect();
        Ok(ReadResult::Lines(lines))
    } else {
        Ok(ReadResult::Data(render::<U>(&data)))
    }
}

fn filter_lines(result: ReadResult, pattern: &str, ignore_case: bool) -> Result<ReadResult> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| CommandError::InvalidArgument(format!("Invalid regex: {e}")))?;
    let lines = match result {
        ReadResult::Lines(lines) => lines,
        ReadResult::Data(data) => vec![data],
    };
    Ok(ReadResult::Lines(
        lines.into_iter().filter(|line| regex.is_match(line)).collect(),
    ))
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn cmd_write(
    path: &Path,
    data: &str,
    line: bool,
    append: bool,
    escapes: bool,
    encoding: Encoding,
    options: StreamOptions,
    format: OutputFormat,
) -> Result<String> {
    let payload = if escapes {
        let mut decoder = EscapeDecoder::new(encoding);
        let mut bytes = Vec::new();
        decoder.decode(data, &mut bytes)?;
        decoder.finish()?;
        bytes
    } else {
        encoding.encode(data)?.into_owned()
    };

    let mode = if append { "ab" } else { "wb" };
    let mut file = Stream::<FileBackend, RawBuffer>::open_with(path, mode, encoding, options)?;
    if line {
        file.write_line(&payload)?;
    } else {
        file.write(&payload)?;
    }
    file.close()?;

    let written = payload.len() + if line { crate::core::LINE_SEPARATOR.len() } else { 0 };
    Ok(format_write(path, written, append, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run(args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("uio").chain(args.iter().copied())).unwrap();
        execute(&cli)
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path = path.to_str().unwrap();

        assert_eq!(run(&["write", path, "alpha", "--line"]).unwrap(), format!("Wrote 6 bytes to {path}\n"));
        run(&["write", path, "beta\\x21", "--line", "--append", "--escapes"]).unwrap();

        assert_eq!(run(&["read", path]).unwrap(), "alpha\nbeta!\n");
        assert_eq!(run(&["read", path, "--until", "\n"]).unwrap(), "alpha");
        assert_eq!(run(&["read", path, "--bytes", "3"]).unwrap(), "alp");
        assert_eq!(run(&["read", path, "--grep", "^B", "-i"]).unwrap(), "beta!\n");
    }

    #[test]
    fn test_read_raw_escapes_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, b"\x00ok\xff").unwrap();
        let out = run(&["read", path.to_str().unwrap(), "--raw"]).unwrap();
        assert_eq!(out, "\\x00ok\\xff");
    }

    #[test]
    fn test_bad_regex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "x").unwrap();
        let err = run(&["read", path.to_str().unwrap(), "--grep", "("]).unwrap_err();
        assert!(matches!(err, crate::Error::Command(CommandError::InvalidArgument(_))));
    }
}
