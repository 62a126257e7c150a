//! The handle for one admitted unit of work.
//!
//! An [`AdmissionPermit`] carries the single-use capability to give the
//! concurrency slot back. It may be cloned and handed to every completion
//! path a transport has (success callback, error path, connection close);
//! whichever path fires first releases the slot and the others are no-ops.
//! If no path ever fires, dropping the last clone releases it.

use crate::controller::ControllerShared;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How an admitted unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The downstream handler finished normally.
    Success,
    /// The downstream handler failed.
    Error,
    /// The work was abandoned, for example by a timeout or a dropped future.
    Cancelled,
    /// The connection carrying the unit went away.
    Closed,
}

struct PermitState {
    id: u64,
    admitted_at: Instant,
    released: AtomicBool,
    shared: Weak<ControllerShared>,
}

impl PermitState {
    fn release(&self, reason: CompletionReason) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            trace!(permit = self.id, ?reason, "permit already released");
            return false;
        }

        match self.shared.upgrade() {
            Some(shared) => {
                shared.concurrency.release();
                shared.metrics.record_completed();
                debug!(
                    permit = self.id,
                    ?reason,
                    held_us = self.admitted_at.elapsed().as_micros() as u64,
                    "permit released"
                );
            }
            None => debug!(permit = self.id, ?reason, "controller gone, release ignored"),
        }
        true
    }
}

impl Drop for PermitState {
    fn drop(&mut self) {
        self.release(CompletionReason::Cancelled);
    }
}

/// A unit of work that passed admission.
#[derive(Clone)]
pub struct AdmissionPermit {
    state: Arc<PermitState>,
}

impl std::fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("id", &self.state.id)
            .field("released", &self.is_released())
            .finish()
    }
}

impl AdmissionPermit {
    pub(crate) fn new(id: u64, admitted_at: Instant, shared: Weak<ControllerShared>) -> Self {
        Self {
            state: Arc::new(PermitState {
                id,
                admitted_at,
                released: AtomicBool::new(false),
                shared,
            }),
        }
    }

    /// Identifier of this unit, unique per controller.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Time since admission.
    pub fn elapsed(&self) -> Duration {
        self.state.admitted_at.elapsed()
    }

    /// Returns true once the slot has been given back.
    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }

    /// Marks the unit as finished successfully.
    ///
    /// Returns true if this call released the slot, false if an earlier
    /// completion already had.
    pub fn complete(&self) -> bool {
        self.state.release(CompletionReason::Success)
    }

    /// Marks the unit as finished for `reason`. Same contract as [`complete`](Self::complete).
    pub fn complete_with(&self, reason: CompletionReason) -> bool {
        self.state.release(reason)
    }

    /// Drives `work` while holding the slot.
    ///
    /// The slot is released when `work` finishes, or, if the returned future
    /// is dropped before that, when this permit is dropped with it.
    pub async fn run<F: Future>(self, work: F) -> F::Output {
        let output = work.await;
        self.complete();
        output
    }

    /// Like [`run`](Self::run), recording [`CompletionReason::Error`] when
    /// `work` fails.
    pub async fn run_fallible<T, E, F>(self, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let output = work.await;
        let reason = match output {
            Ok(_) => CompletionReason::Success,
            Err(_) => CompletionReason::Error,
        };
        self.complete_with(reason);
        output
    }
}
