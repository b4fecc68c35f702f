//! Thin wrappers over the few libc calls std does not expose.

// poll(2), kill(2) and signal(2) have no safe std equivalent
#![allow(unsafe_code)]

use crate::error::{IoError, Result};
use crate::io::Transfer;
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Waits until `fd` is readable or `wait` elapses. `None` waits forever.
///
/// Hang-ups and errors count as readable so that the following read
/// reports them. An interrupted wait reports "not ready".
pub(crate) fn wait_readable(fd: BorrowedFd<'_>, wait: Option<Duration>) -> Result<bool> {
    let mut pfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = wait.map_or(-1, |wait| {
        let rounded_up = wait.as_nanos().div_ceil(1_000_000);
        libc::c_int::try_from(rounded_up).unwrap_or(libc::c_int::MAX)
    });

    // SAFETY: `pfd` is a valid pollfd for the duration of the call and the
    // descriptor is kept open by the borrow.
    let rc = unsafe { libc::poll(&raw mut pfd, 1, millis) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err.into());
    }
    Ok(rc > 0)
}

/// Polls `handle`, then performs one read into `buf`.
pub(crate) fn read_ready<F>(handle: &F, buf: &mut [u8], wait: Option<Duration>) -> Result<Transfer>
where
    F: AsFd,
    for<'a> &'a F: Read,
{
    if !wait_readable(handle.as_fd(), wait)? {
        return Ok(Transfer::Pending);
    }
    let mut reader = handle;
    loop {
        match reader.read(buf) {
            Ok(0) => return Ok(Transfer::Closed),
            Ok(n) => return Ok(Transfer::Data(n)),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(Transfer::Pending),
            Err(err) => return Err(err.into()),
        }
    }
}

/// Sends `signal` to `pid`. A process that is already gone is not an error.
pub(crate) fn send_signal(pid: u32, signal: libc::c_int) -> Result<()> {
    let target = libc::pid_t::try_from(pid).map_err(|_| IoError::SignalFailed {
        pid,
        reason: "pid out of range".to_string(),
    })?;

    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(target, signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(IoError::SignalFailed {
        pid,
        reason: err.to_string(),
    }
    .into())
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Catches SIGINT while alive and restores the previous disposition on drop.
#[derive(Debug)]
pub(crate) struct InterruptGuard {
    previous: libc::sighandler_t,
}

impl InterruptGuard {
    pub(crate) fn install() -> Self {
        INTERRUPTED.store(false, Ordering::SeqCst);
        let handler = on_interrupt as extern "C" fn(libc::c_int);
        // SAFETY: the handler only touches an atomic, which is async-signal-safe.
        let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
        Self { previous }
    }

    /// Returns true once SIGINT arrived after installation.
    pub(crate) fn fired(&self) -> bool {
        INTERRUPTED.load(Ordering::SeqCst)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.previous != libc::SIG_ERR {
            // SAFETY: restores the disposition returned by signal(2) above.
            unsafe {
                libc::signal(libc::SIGINT, self.previous);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_wait_readable_times_out() {
        let (left, _right) = UnixStream::pair().unwrap();
        let ready = wait_readable(left.as_fd(), Some(Duration::from_millis(10))).unwrap();
        assert!(!ready);
    }

    #[test]
    fn test_read_ready_data_and_close() {
        let (left, mut right) = UnixStream::pair().unwrap();
        right.write_all(b"ping").unwrap();

        let mut buf = [0u8; 16];
        let got = read_ready(&left, &mut buf, Some(Duration::ZERO)).unwrap();
        assert_eq!(got, Transfer::Data(4));
        assert_eq!(&buf[..4], b"ping");

        drop(right);
        let got = read_ready(&left, &mut buf, None).unwrap();
        assert_eq!(got, Transfer::Closed);
    }

    #[test]
    fn test_signal_missing_process_is_ok() {
        // pid_max on Linux is at most 2^22
        assert!(send_signal(4_194_304 + 17, 0).is_ok());
    }
}
