//! Scoped timeouts and deadlines.
//!
//! Every stream owns a [`TimeoutStack`]. The bottom frame never expires;
//! each scope opened with [`Timeoutable::scoped`] pushes a frame carrying a
//! per-call timeout and an absolute deadline, and pops it again when the
//! returned [`TimeoutGuard`] goes away.
//!
//! Checks are lazy: nothing interrupts a running OS call. A stream asks
//! [`TimeoutStack::remaining`] right before each blocking primitive and uses
//! the answer to bound that call.

use crate::error::{Error, Result};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// Bounds requested for a timeout scope.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use unified_io::core::TimeoutScope;
///
/// let scope = TimeoutScope::total(Duration::from_secs(2)).with_timeout(Duration::from_millis(500));
/// assert_eq!(scope.timeout, Some(Duration::from_millis(500)));
/// assert!(!scope.overwrite);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeoutScope {
    /// Upper bound for each blocking call inside the scope.
    pub timeout: Option<Duration>,
    /// Upper bound for the whole scope, turned into a deadline when entered.
    pub total: Option<Duration>,
    /// Ignore the bounds of enclosing scopes.
    pub overwrite: bool,
}

impl TimeoutScope {
    /// A scope bounding each blocking call by `timeout`.
    #[must_use]
    pub const fn per_call(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            total: None,
            overwrite: false,
        }
    }

    /// A scope that must complete within `total`.
    #[must_use]
    pub const fn total(total: Duration) -> Self {
        Self {
            timeout: None,
            total: Some(total),
            overwrite: false,
        }
    }

    /// A scope without bounds of its own.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            timeout: None,
            total: None,
            overwrite: false,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the total budget.
    #[must_use]
    pub const fn with_total(mut self, total: Duration) -> Self {
        self.total = Some(total);
        self
    }

    /// Detaches the scope from its parents' bounds.
    #[must_use]
    pub const fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Builds a scope from fractional seconds. A negative value means no bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for NaN or values too large to represent.
    pub fn from_secs(timeout: Option<f64>, total: Option<f64>) -> Result<Self> {
        let convert = |secs: Option<f64>| -> Result<Option<Duration>> {
            match secs {
                Some(secs) if secs < 0.0 => Ok(None),
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .map(Some)
                    .map_err(|_| Error::invalid(format!("invalid timeout: {secs}"))),
                None => Ok(None),
            }
        };
        Ok(Self {
            timeout: convert(timeout)?,
            total: convert(total)?,
            overwrite: false,
        })
    }
}

#[derive(Debug, Clone)]
struct Frame {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    overwrite: bool,
    tripped: bool,
}

impl Frame {
    const fn root() -> Self {
        Self {
            timeout: None,
            deadline: None,
            overwrite: true,
            tripped: false,
        }
    }

    /// Own bound of this frame; `Err` once its deadline has passed.
    fn bound(&self, now: Instant) -> Result<Option<Duration>> {
        let left = match self.deadline {
            Some(deadline) if deadline <= now => {
                return Err(Error::Timeout {
                    context: "deadline exceeded",
                });
            }
            Some(deadline) => Some(deadline - now),
            None => None,
        };
        Ok(min_bound(left, self.timeout))
    }
}

fn min_bound(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Per-stream stack of timeout frames.
#[derive(Debug, Clone)]
pub struct TimeoutStack {
    frames: Vec<Frame>,
}

impl Default for TimeoutStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutStack {
    /// Creates a stack holding only the unbounded root frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::root()],
        }
    }

    /// Number of frames, including the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pushes a frame for `scope`, returning the depth to restore on exit.
    pub fn push(&mut self, scope: TimeoutScope) -> usize {
        let depth = self.frames.len();
        self.frames.push(Frame {
            timeout: scope.timeout,
            deadline: scope.total.and_then(|total| Instant::now().checked_add(total)),
            overwrite: scope.overwrite,
            tripped: false,
        });
        depth
    }

    /// Pops frames down to `depth`. Returns true if the innermost popped
    /// frame finished without a timeout.
    pub fn pop_to(&mut self, depth: usize) -> bool {
        let depth = depth.max(1);
        let safe = self.frames.get(depth).is_none_or(|frame| !frame.tripped);
        self.frames.truncate(depth);
        safe
    }

    /// Time the next blocking call may take, `None` meaning no limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the active scope, or a parent it does
    /// not overwrite, has passed its deadline.
    pub fn remaining(&mut self) -> Result<Option<Duration>> {
        let now = Instant::now();
        let mut limit = Ok(None);
        for frame in self.frames.iter().rev() {
            limit = limit.and_then(|limit| frame.bound(now).map(|own| min_bound(limit, own)));
            if limit.is_err() || frame.overwrite {
                break;
            }
        }
        if limit.is_err() {
            self.note_timeout();
        }
        limit
    }

    /// Like [`remaining`](Self::remaining), but never waits: used by probes.
    pub fn check(&mut self) -> Result<()> {
        self.remaining().map(|_| ())
    }

    /// Marks the active scope as having observed a timeout.
    pub fn note_timeout(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.tripped = true;
        }
    }
}

/// Anything that owns a [`TimeoutStack`].
pub trait Timeoutable {
    /// The owned timeout stack.
    fn timeouts(&mut self) -> &mut TimeoutStack;

    /// Time the next blocking call may take; see [`TimeoutStack::remaining`].
    fn remaining(&mut self) -> Result<Option<Duration>> {
        self.timeouts().remaining()
    }

    /// Opens a timeout scope that lasts as long as the returned guard.
    fn scoped(&mut self, scope: TimeoutScope) -> TimeoutGuard<'_, Self>
    where
        Self: Sized,
    {
        let depth = self.timeouts().push(scope);
        tracing::trace!(?scope, depth, "entered timeout scope");
        TimeoutGuard {
            target: self,
            depth,
            done: false,
        }
    }

    /// Runs `f` inside a timeout scope.
    fn with_timeout<R>(&mut self, scope: TimeoutScope, f: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized,
    {
        let mut guard = self.scoped(scope);
        f(&mut guard)
    }
}

/// Active timeout scope. Dereferences to the scoped object.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use unified_io::core::{TimeoutScope, TimeoutStack, Timeoutable};
///
/// struct Clock(TimeoutStack);
/// impl Timeoutable for Clock {
///     fn timeouts(&mut self) -> &mut TimeoutStack {
///         &mut self.0
///     }
/// }
///
/// let mut clock = Clock(TimeoutStack::new());
/// let mut scope = clock.scoped(TimeoutScope::per_call(Duration::from_secs(1)));
/// assert!(scope.remaining().unwrap().is_some());
/// assert!(scope.finish().unwrap());
/// assert_eq!(clock.remaining().unwrap(), None);
/// ```
#[derive(Debug)]
pub struct TimeoutGuard<'a, T: Timeoutable> {
    target: &'a mut T,
    depth: usize,
    done: bool,
}

impl<T: Timeoutable> TimeoutGuard<'_, T> {
    /// Leaves the scope, returning whether it completed without a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the enclosing scope expired meanwhile.
    pub fn finish(mut self) -> Result<bool> {
        self.done = true;
        let stack = self.target.timeouts();
        let safe = stack.pop_to(self.depth);
        stack.check()?;
        Ok(safe)
    }
}

impl<T: Timeoutable> Deref for TimeoutGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: Timeoutable> DerefMut for TimeoutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: Timeoutable> Drop for TimeoutGuard<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            self.target.timeouts().pop_to(self.depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    struct Holder(TimeoutStack);

    impl Timeoutable for Holder {
        fn timeouts(&mut self) -> &mut TimeoutStack {
            &mut self.0
        }
    }

    fn holder() -> Holder {
        Holder(TimeoutStack::new())
    }

    #[test]
    fn test_root_is_unbounded() {
        let mut stack = TimeoutStack::new();
        assert_eq!(stack.remaining().unwrap(), None);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_per_call_timeout() {
        let mut stack = TimeoutStack::new();
        stack.push(TimeoutScope::per_call(Duration::from_millis(50)));
        assert_eq!(stack.remaining().unwrap(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_nested_scope_clamped_by_parent() {
        let mut stack = TimeoutStack::new();
        stack.push(TimeoutScope::per_call(Duration::from_millis(50)));
        stack.push(TimeoutScope::per_call(Duration::from_secs(10)));
        assert_eq!(stack.remaining().unwrap(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_overwrite_ignores_parent() {
        let mut stack = TimeoutStack::new();
        stack.push(TimeoutScope::per_call(Duration::from_millis(50)));
        stack.push(TimeoutScope::per_call(Duration::from_secs(10)).overwrite());
        assert_eq!(stack.remaining().unwrap(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_deadline_expires_lazily() {
        let mut stack = TimeoutStack::new();
        stack.push(TimeoutScope::total(Duration::from_millis(20)));
        let left = stack.remaining().unwrap().unwrap();
        assert!(left <= Duration::from_millis(20));

        sleep(Duration::from_millis(40));
        assert!(stack.remaining().unwrap_err().is_timeout());
    }

    #[test]
    fn test_expired_parent_fails_child() {
        let mut stack = TimeoutStack::new();
        stack.push(TimeoutScope::total(Duration::from_millis(10)));
        stack.push(TimeoutScope::unbounded());
        sleep(Duration::from_millis(30));
        assert!(stack.remaining().is_err());

        stack.push(TimeoutScope::unbounded().overwrite());
        assert_eq!(stack.remaining().unwrap(), None);
    }

    #[test]
    fn test_guard_pops_on_drop() {
        let mut h = holder();
        {
            let mut scope = h.scoped(TimeoutScope::per_call(Duration::from_secs(1)));
            assert_eq!(scope.timeouts().depth(), 2);
        }
        assert_eq!(h.0.depth(), 1);
    }

    #[test]
    fn test_finish_reports_unsafe_scope() {
        let mut h = holder();
        let mut scope = h.scoped(TimeoutScope::total(Duration::from_millis(5)));
        sleep(Duration::from_millis(20));
        assert!(scope.remaining().is_err());
        assert!(!scope.finish().unwrap());
        assert_eq!(h.0.depth(), 1);
    }

    #[test]
    fn test_finish_revalidates_parent() {
        let mut h = holder();
        let mut outer = h.scoped(TimeoutScope::total(Duration::from_millis(10)));
        let inner = outer.scoped(TimeoutScope::unbounded().overwrite());
        sleep(Duration::from_millis(30));
        assert!(inner.finish().unwrap_err().is_timeout());
    }

    #[test]
    fn test_with_timeout_closure() {
        let mut h = holder();
        let left = h.with_timeout(TimeoutScope::per_call(Duration::from_millis(7)), |h| {
            h.remaining().unwrap()
        });
        assert_eq!(left, Some(Duration::from_millis(7)));
        assert_eq!(h.0.depth(), 1);
    }

    #[test]
    fn test_huge_total_has_no_deadline() {
        let mut stack = TimeoutStack::new();
        stack.push(TimeoutScope::total(Duration::MAX));
        assert_eq!(stack.remaining().unwrap(), None);

        let scope = TimeoutScope::from_secs(None, Some(1e19)).unwrap();
        stack.push(scope);
        assert_eq!(stack.remaining().unwrap(), None);
    }

    #[test]
    fn test_from_secs_negative_is_unbounded() {
        assert_eq!(TimeoutScope::from_secs(Some(-1.0), None).unwrap(), TimeoutScope::unbounded());
        assert!(TimeoutScope::from_secs(Some(f64::NAN), None).is_err());
        let scope = TimeoutScope::from_secs(Some(0.5), Some(2.0)).unwrap();
        assert_eq!(scope.timeout, Some(Duration::from_millis(500)));
        assert_eq!(scope.total, Some(Duration::from_secs(2)));
    }
}
