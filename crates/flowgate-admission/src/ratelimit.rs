//! Fixed-window rate limiting.
//!
//! Time is cut into windows of equal length aligned to the limiter's creation
//! instant. Each window admits at most `max_requests_per_window` units.
//!
//! The window index and the count for that window share one `AtomicU64`
//! (index in the high 32 bits, count in the low 32), so rollover and the
//! increment that follows it are a single compare-and-swap. Two threads
//! racing at a boundary cannot both reset the same stale window.
//!
//! The stored index is 32 bits wide, so indices are compared modulo 2^32. A
//! `now` up to `STALE_TOLERANCE` (64) windows behind the stored window is
//! charged to the stored window; any other distance starts a fresh window.
//! An idle gap aliases onto the stored window only when it lies within that
//! tolerance of a multiple of 2^32 windows.
//!
//! A fixed window admits up to twice the limit across a boundary: `max` at
//! the end of one window, `max` again at the start of the next. Callers that
//! need smoother limiting should use a sliding window behind the same
//! `try_acquire(now)` contract.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[inline]
fn pack(index: u32, count: u32) -> u64 {
    (u64::from(index) << 32) | u64::from(count)
}

#[inline]
fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, state as u32)
}

/// How many windows a `now` may lag the stored window and still be charged
/// to it.
const STALE_TOLERANCE: u32 = 64;

/// True when `current` must replace the `stored` window: it is later, or it
/// lags by more than [`STALE_TOLERANCE`] windows and can only be an index
/// that wrapped.
#[inline]
fn rolls_over(current: u32, stored: u32) -> bool {
    let lag = stored.wrapping_sub(current);
    current != stored && lag > STALE_TOLERANCE
}

/// Lock-free fixed-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    epoch: Instant,
    state: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter whose first window starts at `epoch`.
    ///
    /// `max_per_window == 0` disables limiting. `window` must be non-zero;
    /// [`AdmissionConfig::validate`](crate::AdmissionConfig::validate) checks this.
    pub fn new(max_per_window: u32, window: Duration, epoch: Instant) -> Self {
        Self {
            max_per_window,
            window: window.max(Duration::from_nanos(1)),
            epoch,
            state: AtomicU64::new(pack(0, 0)),
        }
    }

    /// Returns true when this limiter never refuses.
    pub fn is_disabled(&self) -> bool {
        self.max_per_window == 0
    }

    /// Admits one unit at `now` if the window containing `now` has room.
    ///
    /// A `now` slightly older than the current window is charged to the
    /// current window; the window never moves backwards for it.
    pub fn try_acquire(&self, now: Instant) -> bool {
        if self.is_disabled() {
            return true;
        }

        let current = self.window_index(now);
        let mut observed = self.state.load(Ordering::Acquire);
        loop {
            let (index, count) = match unpack(observed) {
                (index, _) if rolls_over(current, index) => (current, 0),
                stored => stored,
            };

            if count >= self.max_per_window {
                return false;
            }

            match self.state.compare_exchange_weak(
                observed,
                pack(index, count + 1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => observed = actual,
            }
        }
    }

    /// Admissions still available in the window containing `now`.
    pub fn remaining(&self, now: Instant) -> u32 {
        if self.is_disabled() {
            return u32::MAX;
        }
        let (index, count) = unpack(self.state.load(Ordering::Acquire));
        if rolls_over(self.window_index(now), index) {
            self.max_per_window
        } else {
            self.max_per_window.saturating_sub(count)
        }
    }

    /// Time from `now` until the next window starts. Always in `(0, window]`.
    pub fn time_until_next_window(&self, now: Instant) -> Duration {
        let window_nanos = self.window.as_nanos();
        let into_window = now.saturating_duration_since(self.epoch).as_nanos() % window_nanos;
        let left = window_nanos - into_window;
        Duration::from_nanos(u64::try_from(left).unwrap_or(u64::MAX))
    }

    /// Configured admissions per window.
    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    /// Configured window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_index(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos();
        // Truncation is intended; indices are compared with wrap-around.
        (elapsed / self.window.as_nanos()) as u32
    }
}
