use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::foundation::error::{FramecastError, FramecastResult};

/// Default number of frames allowed in flight at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 3;

/// Counting gate bounding how many frames may be in flight between CPU production and GPU
/// retirement.
///
/// The tick context calls [`FrameSlotLimiter::acquire`] before producing a frame; the command
/// queue's completion context calls [`FrameSlotLimiter::release`] once the frame is retired.
/// Both sides may run on different threads; the limiter is shared behind an `Arc`.
///
/// Invariant: `0 <= available <= max`.
#[derive(Debug)]
pub struct FrameSlotLimiter {
    max: usize,
    available: Mutex<usize>,
    freed: Condvar,
}

impl FrameSlotLimiter {
    pub fn new(max: usize) -> FramecastResult<Self> {
        if max == 0 {
            return Err(FramecastError::validation("max_in_flight must be >= 1"));
        }
        Ok(Self {
            max,
            available: Mutex::new(max),
            freed: Condvar::new(),
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        *self.lock()
    }

    /// Frames currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max - self.available()
    }

    /// Block until a slot is free, then take it.
    ///
    /// There is no timeout: a wedged GPU stalls frame production here indefinitely.
    pub fn acquire(&self) {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .freed
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
    }

    /// Take a slot if one is free without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut available = self.lock();
        if *available == 0 {
            return false;
        }
        *available -= 1;
        true
    }

    /// Return a slot and wake waiters (also `wait_idle` callers).
    ///
    /// Releasing with every slot already free is ignored (the count never exceeds `max`); the
    /// return value reports whether a slot was actually returned.
    pub fn release(&self) -> bool {
        let mut available = self.lock();
        if *available >= self.max {
            tracing::warn!(max = self.max, "frame slot released while none were held");
            return false;
        }
        *available += 1;
        drop(available);
        self.freed.notify_all();
        true
    }

    /// Wait until every slot has been returned, or `timeout` elapses.
    ///
    /// Returns `true` when the limiter drained completely.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut available = self.lock();
        while *available < self.max {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .freed
                .wait_timeout(available, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            available = guard;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/slots.rs"]
mod tests;
