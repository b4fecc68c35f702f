//! Interactive bridge between a stream and a terminal.
//!
//! Two workers run side by side: one copies the stream to the terminal,
//! rendering raw bytes through the escape codec, and one copies the
//! terminal to the stream. Each worker writes through a duplicated OS
//! handle, so neither touches the other's buffers.

use super::Stream;
use super::pipe::{PipeOutcome, StopSignal, forward};
use crate::codec::{EscapeBuffer, escape};
use crate::core::{Buffer, Encoding};
use crate::error::{Error, IoError, Result};
use crate::io::{DuplexBackend, Sink, Source, sys::InterruptGuard};
use std::thread;

const BANNER_ENTER: &str = "[*] Switching to interactive mode";
const BANNER_EXIT: &str = "[*] Exiting interactive mode";

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEnd {
    /// The stream reached end of input.
    RemoteClosed,
    /// The terminal reached end of input.
    LocalClosed,
    /// Ctrl-C was pressed.
    Interrupted,
}

/// Escapes incoming data for the terminal. Text is first encoded back to
/// the bytes the stream received.
fn render<U: Buffer>(data: &U::Data, encoding: Encoding) -> Vec<u8> {
    let bytes = data.as_ref();
    if U::BINARY {
        return escape::encode(bytes).into_bytes();
    }
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| encoding.encode(text).ok())
        .map_or_else(|| escape::encode(bytes), |raw| escape::encode(&raw))
        .into_bytes()
}

fn joined(res: thread::Result<Result<PipeOutcome>>) -> Result<PipeOutcome> {
    res.map_err(|_| Error::Io(IoError::Generic("bridge worker panicked".to_string())))?
}

impl<B, U> Stream<B, U>
where
    B: Source + Sink,
    U: Buffer,
{
    /// Bridges the stream with this process's stdin and stdout until
    /// either side closes or Ctrl-C is pressed.
    ///
    /// Incoming bytes that are not printable are shown as `\xHH`; typed
    /// `\xHH`, `\\`, `\0` and `\#expr#` escapes are decoded before they
    /// are sent.
    pub fn interact(&mut self) -> Result<BridgeEnd> {
        let mut terminal: Stream<DuplexBackend, EscapeBuffer> =
            Stream::stdio(Encoding::default(), self.options)?;
        self.interact_with(&mut terminal)
    }

    /// Like [`interact`](Self::interact), against an arbitrary terminal stream.
    pub fn interact_with<T, V>(&mut self, terminal: &mut Stream<T, V>) -> Result<BridgeEnd>
    where
        T: Source + Sink,
        V: Buffer,
    {
        let mut to_terminal = terminal.backend.writer()?;
        let mut to_remote = self.backend.writer()?;
        let poll = self.options.poll_interval;
        let encoding = self.input.encoding();
        let stop = StopSignal::new();

        terminal.write_line(BANNER_ENTER)?;
        tracing::debug!(stream = %self.backend.describe(), "interactive mode");

        let interrupt = InterruptGuard::install();
        let mut interrupted = false;
        let (remote, local) = thread::scope(|scope| {
            let remote = scope.spawn(|| {
                forward(self, &mut to_terminal, &stop, poll, |data: &U::Data| {
                    render::<U>(data, encoding)
                })
            });
            let local = scope.spawn(|| {
                forward(terminal, &mut to_remote, &stop, poll, |data: &V::Data| {
                    data.as_ref().to_vec()
                })
            });
            while !stop.wait_timeout(poll) {
                if interrupt.fired() {
                    interrupted = true;
                    stop.set();
                }
            }
            (joined(remote.join()), joined(local.join()))
        });
        drop(interrupt);

        let end = match (remote, local) {
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!(error = %err, "interactive bridge failed");
                return Err(err);
            }
            _ if interrupted => BridgeEnd::Interrupted,
            (Ok(PipeOutcome::Eof), _) => BridgeEnd::RemoteClosed,
            (_, Ok(PipeOutcome::Eof)) => BridgeEnd::LocalClosed,
            _ => BridgeEnd::Interrupted,
        };
        tracing::debug!(?end, "leaving interactive mode");
        terminal.write_line(BANNER_EXIT)?;
        Ok(end)
    }
}
