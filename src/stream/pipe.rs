//! Background forwarding from a stream into any writer.

use super::Stream;
use crate::core::{Buffer, TimeoutScope, Timeoutable};
use crate::error::{Error, Result};
use crate::io::Source;
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cancellation flag shared between a forwarding worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal and wakes every waiter.
    pub fn set(&self) {
        let (flag, cond) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cond.notify_all();
    }

    /// Returns true once [`set`](Self::set) was called.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the signal is set.
    pub fn wait(&self) {
        let (flag, cond) = &*self.inner;
        let mut set = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*set {
            set = cond.wait(set).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the signal is set or `timeout` elapses. Returns whether it is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cond) = &*self.inner;
        let set = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (set, _) = cond
            .wait_timeout_while(set, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *set
    }
}

/// Why a forwarding loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeOutcome {
    /// The source reached end of input.
    Eof,
    /// The stop signal was set.
    Cancelled,
}

/// Copies from `stream` into `dest` until end of input or `stop` is set.
///
/// Each read is bounded by `poll`, so cancellation is noticed within one
/// poll interval. The loop sets `stop` itself when it ends, so peers
/// sharing the signal wind down too.
pub(crate) fn forward<B, U, W, F>(
    stream: &mut Stream<B, U>,
    dest: &mut W,
    stop: &StopSignal,
    poll: Duration,
    mut render: F,
) -> Result<PipeOutcome>
where
    B: Source,
    U: Buffer,
    W: Write + ?Sized,
    F: FnMut(&U::Data) -> Vec<u8>,
{
    let res = loop {
        if stop.is_set() {
            break Ok(PipeOutcome::Cancelled);
        }
        let chunk = stream.with_timeout(TimeoutScope::per_call(poll).overwrite(), |s| s.read_lazy());
        match chunk {
            Ok(data) => {
                let bytes = render(&data);
                if let Err(err) = dest.write_all(&bytes).and_then(|()| dest.flush()) {
                    break Err(Error::from(err));
                }
            }
            Err(err) if err.is_timeout() => {}
            Err(Error::EndOfStream) => break Ok(PipeOutcome::Eof),
            Err(err) => break Err(err),
        }
    };
    stop.set();
    res
}

/// Handle to a running [`Stream::pipe`] worker.
#[derive(Debug)]
pub struct PipeHandle<B, U: Buffer> {
    stop: StopSignal,
    join: JoinHandle<(Stream<B, U>, Result<PipeOutcome>)>,
}

impl<B, U: Buffer> PipeHandle<B, U> {
    /// The worker's stop signal.
    #[must_use]
    pub const fn signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Returns true once the worker has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Asks the worker to stop, then hands back the stream and how the loop ended.
    pub fn cancel(self) -> Result<(Stream<B, U>, PipeOutcome)> {
        self.stop.set();
        self.join()
    }

    /// Waits for the worker to stop on its own.
    pub fn join(self) -> Result<(Stream<B, U>, PipeOutcome)> {
        let (stream, outcome) = self.join.join().map_err(|_| {
            Error::Io(crate::error::IoError::Generic(
                "forwarding worker panicked".to_string(),
            ))
        })?;
        Ok((stream, outcome?))
    }
}

impl<B, U> Stream<B, U>
where
    B: Source + 'static,
    U: Buffer,
{
    /// Moves the stream into a worker thread that copies everything it
    /// reads into `dest`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use unified_io::{ProcessStream, RawBuffer};
    ///
    /// let proc = ProcessStream::<RawBuffer>::spawn("yes | head -n 3").unwrap();
    /// let handle = proc.pipe(std::io::stdout());
    /// let (proc, outcome) = handle.join().unwrap();
    /// ```
    pub fn pipe<W: Write + Send + 'static>(self, dest: W) -> PipeHandle<B, U> {
        self.pipe_with(dest, StopSignal::new())
    }

    /// Like [`pipe`](Self::pipe), sharing an existing stop signal.
    pub fn pipe_with<W: Write + Send + 'static>(
        mut self,
        mut dest: W,
        stop: StopSignal,
    ) -> PipeHandle<B, U> {
        let poll = self.options.poll_interval;
        let worker_stop = stop.clone();
        tracing::debug!(stream = %self.backend.describe(), "starting pipe");
        let join = thread::spawn(move || {
            let outcome = forward(&mut self, &mut dest, &worker_stop, poll, |data| {
                data.as_ref().to_vec()
            });
            if let Err(err) = &outcome {
                tracing::warn!(error = %err, "pipe worker failed");
            }
            (self, outcome)
        });
        PipeHandle { stop, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RawBuffer, StreamOptions};
    use crate::stream::testing::Script;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stop_signal() {
        let stop = StopSignal::new();
        assert!(!stop.wait_timeout(Duration::from_millis(5)));
        let other = stop.clone();
        let t = thread::spawn(move || other.wait());
        stop.set();
        t.join().unwrap();
        assert!(stop.is_set());
        assert!(stop.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn test_pipe_until_eof() {
        let stream = Stream::with_backend(
            Script::chunks([&b"one "[..], &b"two"[..]]),
            RawBuffer::default(),
            StreamOptions::default(),
        );
        let sink = Shared::default();
        let handle = stream.pipe(sink.clone());
        let (_, outcome) = handle.join().unwrap();
        assert_eq!(outcome, PipeOutcome::Eof);
        assert_eq!(*sink.0.lock().unwrap(), b"one two");
    }

    #[test]
    fn test_pipe_cancel_within_poll_interval() {
        let mut script = Script::chunks([b"x"]);
        script.stall = true;
        let stream = Stream::with_backend(
            script,
            RawBuffer::default(),
            StreamOptions::default().with_poll_interval(Duration::from_millis(5)),
        );

        let sink = Shared::default();
        let handle = stream.pipe(sink.clone());
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        let (stream, outcome) = handle.cancel().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(outcome, PipeOutcome::Cancelled);
        assert!(!stream.at_eof());
        assert_eq!(*sink.0.lock().unwrap(), b"x");
    }
}
