//! Deadline budget and bounded polling
//!
//! A [`Deadline`] is computed once at the start of a compound operation and
//! passed down unchanged (or [capped](Deadline::capped)) through every step.
//! All waiting in the engine goes through [`wait_until`], [`try_wait_until`]
//! or the blocking [`BlockingWaiter`], so the poll policy lives here only.

use crate::error::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// Sleep between predicate checks in the async waiters.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// First retry delay of the blocking waiter; doubles up to [`MAX_BACKOFF`].
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
pub const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Absolute expiry on the monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn after(budget: Duration) -> Self {
        Self::at(Instant::now() + budget)
    }

    pub fn after_ms(ms: u64) -> Self {
        Self::after(Duration::from_millis(ms))
    }

    /// A deadline that has already passed. Waiters check once and give up.
    pub fn expired() -> Self {
        Self::at(Instant::now())
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// `max(deadline - now, 0)`
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining().as_millis() as u64
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Sub-deadline for one step: `now + max`, but never later than `self`.
    pub fn capped(&self, max: Duration) -> Deadline {
        let step = Instant::now() + max;
        Deadline::at(self.at.min(step))
    }
}

/// Poll `predicate` until it returns true or the deadline passes.
///
/// Checks immediately, then sleeps `min(POLL_INTERVAL, remaining)` between
/// checks. Returns `false` on expiry; never overshoots by more than one interval.
pub async fn wait_until<F>(deadline: Deadline, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    loop {
        if predicate() {
            return true;
        }
        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return false;
        }
        tokio::time::sleep(remaining.min(POLL_INTERVAL)).await;
    }
}

/// Like [`wait_until`], but a predicate error ends the wait immediately.
pub async fn try_wait_until<F>(deadline: Deadline, mut predicate: F) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    loop {
        if predicate()? {
            return Ok(true);
        }
        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return Ok(false);
        }
        tokio::time::sleep(remaining.min(POLL_INTERVAL)).await;
    }
}

/// Blocking waiter for callers without an async runtime.
///
/// Retries with exponential backoff. A [`Signal`] taken from the waiter wakes
/// it early so the predicate is re-checked as soon as something changes.
pub struct BlockingWaiter {
    tx: Sender<()>,
    rx: Receiver<()>,
}

/// Wakes a [`BlockingWaiter`]. Signals sent while nobody waits coalesce.
#[derive(Clone)]
pub struct Signal {
    tx: Sender<()>,
}

impl Signal {
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

impl BlockingWaiter {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn signal(&self) -> Signal {
        Signal {
            tx: self.tx.clone(),
        }
    }

    pub fn wait<F>(&self, deadline: Deadline, mut predicate: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if predicate() {
                return true;
            }
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return false;
            }
            match self.rx.recv_timeout(remaining.min(backoff)) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => backoff = (backoff * 2).min(MAX_BACKOFF),
                // We hold a sender ourselves, so this cannot happen.
                Err(RecvTimeoutError::Disconnected) => return predicate(),
            }
        }
    }
}

impl Default for BlockingWaiter {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot blocking wait without an external signal.
pub fn wait_until_blocking<F>(deadline: Deadline, predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    BlockingWaiter::new().wait(deadline, predicate)
}
