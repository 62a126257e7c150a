//! Admission control: rate window first, then the in-flight cap.
//!
//! # Decision order
//!
//! 1. The rate limiter sheds absolute arrival load regardless of occupancy.
//! 2. The concurrency limiter protects against slow-draining backlogs.
//!
//! Checking rate first keeps a burst from exhausting slots that a steady
//! low-rate caller could have used. A unit refused only by the concurrency
//! check has still consumed its rate slot for the current window.
//!
//! # Example
//!
//! ```
//! use flowgate_admission::{AdmissionConfig, AdmissionController, Decision, RejectionPolicy};
//! use std::time::Duration;
//!
//! let config = AdmissionConfig::new(1, 100, Duration::from_secs(1))
//!     .with_rejection(RejectionPolicy::respond("429"));
//! let controller = AdmissionController::new(config).unwrap();
//!
//! let mut first: Vec<u8> = Vec::new();
//! let permit = controller.try_admit(&mut first).into_permit().unwrap();
//!
//! let mut second: Vec<u8> = Vec::new();
//! assert!(!controller.try_admit(&mut second).is_admitted());
//! assert_eq!(second, b"429");
//!
//! permit.complete();
//! assert_eq!(controller.active(), 0);
//! ```

use crate::clock::{Clock, SystemClock};
use crate::concurrency::ConcurrencyLimiter;
use crate::config::AdmissionConfig;
use crate::error::Result;
use crate::metrics::{AdmissionMetrics, MetricsSnapshot, RejectCause};
use crate::permit::AdmissionPermit;
use crate::ratelimit::RateLimiter;
use crate::rejection::{RejectionOutcome, ResponseSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// State reachable from both the controller and its outstanding permits.
pub(crate) struct ControllerShared {
    pub(crate) concurrency: ConcurrencyLimiter,
    pub(crate) metrics: AdmissionMetrics,
    rate: RateLimiter,
    config: AdmissionConfig,
    clock: Arc<dyn Clock>,
    next_permit_id: AtomicU64,
}

/// Details of a refused unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    /// Which cap refused the unit.
    pub cause: RejectCause,
    /// For rate rejections, the time until the next window opens.
    pub retry_after: Option<Duration>,
    /// What the rejection policy did to the unit's sink.
    pub outcome: RejectionOutcome,
}

/// Result of an admission attempt.
#[derive(Debug)]
pub enum Decision {
    /// Forward the unit downstream; complete the permit when it finishes.
    Admitted(AdmissionPermit),
    /// The unit was refused and the rejection policy has been applied.
    Rejected(Rejection),
}

impl Decision {
    /// Returns true for [`Decision::Admitted`].
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted(_))
    }

    /// Borrows the permit of an admitted unit.
    pub fn permit(&self) -> Option<&AdmissionPermit> {
        match self {
            Decision::Admitted(permit) => Some(permit),
            Decision::Rejected(_) => None,
        }
    }

    /// Takes the permit of an admitted unit.
    pub fn into_permit(self) -> Option<AdmissionPermit> {
        match self {
            Decision::Admitted(permit) => Some(permit),
            Decision::Rejected(_) => None,
        }
    }

    /// Returns the rejection details of a refused unit.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Decision::Admitted(_) => None,
            Decision::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Gate in front of a downstream handler enforcing a rate window and an
/// in-flight cap.
///
/// Cloning is cheap and every clone shares the same limits and counters, so
/// one controller can be handed to any number of worker threads.
#[derive(Clone)]
pub struct AdmissionController {
    shared: Arc<ControllerShared>,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("config", &self.shared.config)
            .field("snapshot", &self.metrics())
            .finish()
    }
}

impl AdmissionController {
    /// Creates a controller that reads time from the system clock.
    pub fn new(config: AdmissionConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a controller that reads time from `clock`.
    pub fn with_clock(config: AdmissionConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let rate = RateLimiter::new(config.max_requests_per_window, config.window, clock.now());
        info!(
            max_concurrency = ?config.max_concurrency,
            max_requests_per_window = config.max_requests_per_window,
            window_ms = config.window.as_millis() as u64,
            "admission controller created"
        );

        Ok(Self {
            shared: Arc::new(ControllerShared {
                concurrency: ConcurrencyLimiter::new(config.max_concurrency),
                metrics: AdmissionMetrics::new(),
                rate,
                config,
                clock,
                next_permit_id: AtomicU64::new(1),
            }),
        })
    }

    /// Decides whether one arriving unit of work may proceed.
    ///
    /// On rejection the configured policy has already been applied to `sink`
    /// by the time this returns. Never blocks and never fails.
    pub fn try_admit<S: ResponseSink + ?Sized>(&self, sink: &mut S) -> Decision {
        let shared = &self.shared;
        let now = shared.clock.now();

        if !shared.rate.try_acquire(now) {
            let retry_after = shared.rate.time_until_next_window(now);
            return self.reject(RejectCause::Rate, Some(retry_after), sink);
        }

        if !shared.concurrency.try_acquire() {
            return self.reject(RejectCause::Concurrency, None, sink);
        }

        shared.metrics.record_accepted();
        let id = shared.next_permit_id.fetch_add(1, Ordering::Relaxed);
        debug!(permit = id, active = shared.concurrency.active(), "admitted");
        Decision::Admitted(AdmissionPermit::new(id, now, Arc::downgrade(&self.shared)))
    }

    fn reject<S: ResponseSink + ?Sized>(
        &self,
        cause: RejectCause,
        retry_after: Option<Duration>,
        sink: &mut S,
    ) -> Decision {
        let shared = &self.shared;
        shared.metrics.record_rejected(cause);

        let outcome = shared.config.rejection.apply(sink);
        if outcome == RejectionOutcome::DeliveryFailed {
            shared.metrics.record_delivery_failure();
        }

        debug!(cause = cause.as_str(), ?outcome, "rejected");
        Decision::Rejected(Rejection {
            cause,
            retry_after,
            outcome,
        })
    }

    /// Counts a rejection payload that a transport failed to write after
    /// `try_admit` returned, for sinks that flush asynchronously.
    pub fn report_delivery_failure(&self) {
        self.shared.metrics.record_delivery_failure();
    }

    /// Point-in-time copy of the counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared
            .metrics
            .snapshot(self.shared.concurrency.active())
    }

    /// Units currently admitted and not yet released.
    pub fn active(&self) -> u32 {
        self.shared.concurrency.active()
    }

    /// Admissions left in the current rate window.
    pub fn rate_remaining(&self) -> u32 {
        self.shared.rate.remaining(self.shared.clock.now())
    }

    /// The configuration this controller was built from.
    pub fn config(&self) -> &AdmissionConfig {
        &self.shared.config
    }
}
