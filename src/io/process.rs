//! Child process backend.

use crate::core::{Buffer, Encoding, StreamOptions, Timeoutable};
use crate::error::{Error, IoError, Result};
use crate::io::{Backend, Capabilities, Direction, DuplexBackend, Sink, Source, Transfer, sys};
use crate::stream::Stream;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::os::fd::BorrowedFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const WAIT_STEP: Duration = Duration::from_millis(10);

/// What to run: a shell command line or an explicit argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Run through `/bin/sh -c`.
    Shell(String),
    /// Run `argv[0]` with the remaining arguments, without a shell.
    Argv(Vec<OsString>),
}

impl CommandLine {
    /// Builds an argv command line.
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self::Argv(args.into_iter().map(Into::into).collect())
    }

    fn command(&self) -> Result<Command> {
        match self {
            Self::Shell(line) => {
                let mut cmd = Command::new("/bin/sh");
                cmd.arg("-c").arg(line);
                Ok(cmd)
            }
            Self::Argv(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| Error::invalid("empty argument vector"))?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                Ok(cmd)
            }
        }
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        Self::Shell(line.to_string())
    }
}

impl From<String> for CommandLine {
    fn from(line: String) -> Self {
        Self::Shell(line)
    }
}

impl<S: Into<OsString>> From<Vec<S>> for CommandLine {
    fn from(args: Vec<S>) -> Self {
        Self::argv(args)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell(line) => f.write_str(line),
            Self::Argv(argv) => {
                let parts: Vec<_> = argv.iter().map(|a| a.to_string_lossy()).collect();
                f.write_str(&parts.join(" "))
            }
        }
    }
}

/// Converts an exit status to a return code: the exit code, or minus the
/// signal number if the process was killed by a signal.
fn returncode(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

/// Spawned child with piped stdin and stdout; stderr is inherited.
#[derive(Debug)]
pub struct ProcessBackend {
    child: Child,
    pipes: DuplexBackend,
    command: String,
    returncode: Option<i32>,
}

impl ProcessBackend {
    /// Spawns `command`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::SpawnFailed`] if the process cannot be started.
    pub fn spawn(command: &CommandLine) -> Result<Self> {
        let rendered = command.to_string();
        let failed = |reason: String| IoError::SpawnFailed {
            command: rendered.clone(),
            reason,
        };

        let mut child = command
            .command()?
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        if stdin.is_none() || stdout.is_none() {
            return Err(failed("pipes unavailable".to_string()).into());
        }
        let pipes = DuplexBackend::new(stdout, stdin, rendered.clone());
        Ok(Self {
            child,
            pipes,
            command: rendered,
            returncode: None,
        })
    }

    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Return code once the process has been reaped.
    #[must_use]
    pub const fn returncode(&self) -> Option<i32> {
        self.returncode
    }

    /// Reaps the process if it has exited, without blocking.
    pub fn poll(&mut self) -> Result<Option<i32>> {
        if self.returncode.is_none() {
            if let Some(status) = self.child.try_wait()? {
                let code = returncode(status);
                tracing::debug!(pid = self.pid(), code, "process exited");
                self.returncode = Some(code);
            }
        }
        Ok(self.returncode)
    }

    /// Waits up to `limit` for the process to exit. `None` waits forever.
    pub fn wait_for(&mut self, limit: Option<Duration>) -> Result<i32> {
        let start = Instant::now();
        loop {
            if let Some(code) = self.poll()? {
                return Ok(code);
            }
            let step = match limit {
                None => WAIT_STEP,
                Some(limit) => {
                    let elapsed = start.elapsed();
                    if elapsed >= limit {
                        return Err(Error::Timeout {
                            context: "waiting for the process to terminate",
                        });
                    }
                    WAIT_STEP.min(limit - elapsed)
                }
            };
            thread::sleep(step);
        }
    }

    /// Delivers `signal` unless the process was already reaped.
    pub fn send_signal(&mut self, signal: i32) -> Result<()> {
        if self.poll()?.is_some() {
            return Ok(());
        }
        tracing::debug!(pid = self.pid(), signal, "signalling process");
        sys::send_signal(self.pid(), signal)
    }
}

impl Backend for ProcessBackend {
    fn capabilities(&self) -> Capabilities {
        self.pipes.capabilities()
    }

    fn close(&mut self, direction: Direction) -> Result<()> {
        self.pipes.close(direction)
    }

    fn describe(&self) -> String {
        format!("process {} ({})", self.pid(), self.command)
    }

    fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.pipes.fd()
    }
}

impl Source for ProcessBackend {
    fn underflow(&mut self, buf: &mut [u8], wait: Option<Duration>) -> Result<Transfer> {
        self.pipes.underflow(buf, wait)
    }
}

impl Sink for ProcessBackend {
    fn overflow(&mut self, data: &[u8], wait: Option<Duration>) -> Result<()> {
        self.pipes.overflow(data, wait)
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>> {
        self.pipes.writer()
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        if self.returncode.is_some() {
            return;
        }
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        tracing::debug!(pid = self.pid(), "killing unfinished process");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl<U: Buffer> Stream<ProcessBackend, U> {
    /// Spawns a process with the default encoding and options.
    ///
    /// A string runs through the shell; a vector is used as argv.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use unified_io::{ProcessStream, TextBuffer};
    ///
    /// let mut proc = ProcessStream::<TextBuffer>::spawn("cat").unwrap();
    /// proc.write_line("hello").unwrap();
    /// assert_eq!(proc.read_line(false).unwrap(), "hello");
    /// proc.kill().unwrap();
    /// ```
    pub fn spawn(command: impl Into<CommandLine>) -> Result<Self> {
        Self::spawn_with(command, Encoding::default(), StreamOptions::default())
    }

    /// Spawns a process with explicit encoding and options.
    pub fn spawn_with(
        command: impl Into<CommandLine>,
        encoding: Encoding,
        options: StreamOptions,
    ) -> Result<Self> {
        let backend = ProcessBackend::spawn(&command.into())?;
        tracing::debug!(pid = backend.pid(), command = %backend.command, "spawned");
        Ok(Self::with_backend(backend, U::with_encoding(encoding), options))
    }

    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.backend.pid()
    }

    /// Return code if the process has exited: the exit code, or minus the
    /// signal number for a process killed by a signal.
    pub fn returncode(&mut self) -> Result<Option<i32>> {
        self.backend.poll()
    }

    /// Waits for the process to exit, bounded by the active timeout scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the process is still running when the
    /// scope runs out.
    pub fn wait(&mut self) -> Result<i32> {
        let limit = self.remaining()?;
        let res = self.backend.wait_for(limit);
        if res.as_ref().is_err_and(Error::is_timeout) {
            self.timeouts.note_timeout();
        }
        res
    }

    /// Sends `signal`, then waits for the process to exit.
    pub fn signal(&mut self, signal: i32) -> Result<i32> {
        self.backend.send_signal(signal)?;
        self.wait()
    }

    /// Sends `SIGKILL`, then waits.
    pub fn kill(&mut self) -> Result<i32> {
        self.signal(libc::SIGKILL)
    }

    /// Sends `SIGTERM`, then waits.
    pub fn terminate(&mut self) -> Result<i32> {
        self.signal(libc::SIGTERM)
    }
}
