//! What happens to a unit of work that fails admission.
//!
//! A rejected unit was never admitted, so it never holds a concurrency slot
//! and needs no release. Applying a policy never fails past this module: a
//! payload that cannot be written is reported as
//! [`RejectionOutcome::DeliveryFailed`] and otherwise swallowed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io;
use tracing::{trace, warn};

/// The caller-facing side of a unit of work, as seen by a rejection policy.
pub trait ResponseSink {
    /// Writes `payload` as the complete response of the unit.
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Terminates the unit as if it had completed normally.
    fn close(&mut self);
}

impl ResponseSink for Vec<u8> {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        self.extend_from_slice(payload);
        Ok(())
    }

    fn close(&mut self) {}
}

/// Sink that accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResponseSink for NullSink {
    fn write_payload(&mut self, _payload: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Behavior applied to a rejected unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Write `payload` back to the caller, then close the unit.
    Respond {
        /// Complete response body sent to a rejected caller.
        payload: Bytes,
    },
    /// Write nothing; the caller relies on its own timeout.
    #[default]
    Drop,
}

/// What a policy actually did to a rejected unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionOutcome {
    /// The payload was written and the unit closed.
    Responded,
    /// Nothing was written.
    Dropped,
    /// Writing the payload failed; the unit was closed anyway.
    DeliveryFailed,
}

impl RejectionPolicy {
    /// Shorthand for [`RejectionPolicy::Respond`].
    pub fn respond(payload: impl Into<Bytes>) -> Self {
        RejectionPolicy::Respond {
            payload: payload.into(),
        }
    }

    /// Returns the response payload, if this policy writes one.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            RejectionPolicy::Respond { payload } => Some(payload),
            RejectionPolicy::Drop => None,
        }
    }

    /// Applies the policy to `sink`.
    pub fn apply<S: ResponseSink + ?Sized>(&self, sink: &mut S) -> RejectionOutcome {
        match self {
            RejectionPolicy::Respond { payload } => {
                let outcome = match sink.write_payload(payload) {
                    Ok(()) => RejectionOutcome::Responded,
                    Err(e) => {
                        warn!(error = %e, len = payload.len(), "failed to deliver rejection payload");
                        RejectionOutcome::DeliveryFailed
                    }
                };
                sink.close();
                outcome
            }
            RejectionPolicy::Drop => {
                trace!("dropping rejected unit");
                RejectionOutcome::Dropped
            }
        }
    }
}
