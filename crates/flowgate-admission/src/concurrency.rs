//! In-flight cap for admitted units of work.
//!
//! The hot path is a single compare-and-swap loop on one counter, so
//! admission never blocks under many concurrent I/O threads.

use std::sync::atomic::{AtomicU32, Ordering};

/// Counts admitted, not yet released units and refuses new ones at the cap.
///
/// A limiter built without a cap still counts, so the in-flight gauge stays
/// accurate, but never refuses.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    limit: Option<u32>,
    active: AtomicU32,
}

impl ConcurrencyLimiter {
    /// Creates a limiter capped at `limit` in-flight units, or uncapped for `None`.
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            limit,
            active: AtomicU32::new(0),
        }
    }

    /// Takes a slot if one is free. Leaves the count untouched on failure.
    pub fn try_acquire(&self) -> bool {
        let max = self.limit.unwrap_or(u32::MAX);
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= max {
                return false;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Gives a slot back. Never goes below zero.
    pub fn release(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            });
    }

    /// Number of slots currently held.
    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }

    /// The configured cap, `None` when unlimited.
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Free slots left, `None` when unlimited.
    pub fn available(&self) -> Option<u32> {
        self.limit.map(|max| max.saturating_sub(self.active()))
    }
}
