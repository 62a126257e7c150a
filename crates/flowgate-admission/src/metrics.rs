//! Admission metrics collection.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a unit of work was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCause {
    /// The current rate window was full.
    Rate,
    /// Too many units were already in flight.
    Concurrency,
}

impl RejectCause {
    /// Label used in logs and exported metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCause::Rate => "rate",
            RejectCause::Concurrency => "concurrency",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Point-in-time copy of the admission counters.
pub struct MetricsSnapshot {
    /// Units admitted.
    pub accepted: u64,
    /// Units rejected because the rate window was full.
    pub rejected_by_rate: u64,
    /// Units rejected because the in-flight cap was reached.
    pub rejected_by_concurrency: u64,
    /// Units admitted and not yet released.
    pub currently_active: u32,
    /// Admitted units whose slot has been released.
    pub completed: u64,
    /// Rejection payloads that could not be written.
    pub rejection_delivery_failures: u64,
}

impl MetricsSnapshot {
    /// Total rejections of either cause.
    pub fn rejected(&self) -> u64 {
        self.rejected_by_rate + self.rejected_by_concurrency
    }

    /// Total admission decisions made.
    pub fn decisions(&self) -> u64 {
        self.accepted + self.rejected()
    }

    /// Renders the snapshot in the Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP flowgate_admitted_total Units of work admitted\n");
        output.push_str("# TYPE flowgate_admitted_total counter\n");
        let _ = writeln!(output, "flowgate_admitted_total {}", self.accepted);

        output.push_str("# HELP flowgate_rejected_total Units of work rejected by cause\n");
        output.push_str("# TYPE flowgate_rejected_total counter\n");
        let _ = writeln!(
            output,
            "flowgate_rejected_total{{cause=\"{}\"}} {}",
            RejectCause::Rate.as_str(),
            self.rejected_by_rate
        );
        let _ = writeln!(
            output,
            "flowgate_rejected_total{{cause=\"{}\"}} {}",
            RejectCause::Concurrency.as_str(),
            self.rejected_by_concurrency
        );

        output.push_str("# HELP flowgate_completed_total Admitted units released\n");
        output.push_str("# TYPE flowgate_completed_total counter\n");
        let _ = writeln!(output, "flowgate_completed_total {}", self.completed);

        output.push_str(
            "# HELP flowgate_rejection_delivery_failures_total Rejection payloads that could not be written\n",
        );
        output.push_str("# TYPE flowgate_rejection_delivery_failures_total counter\n");
        let _ = writeln!(
            output,
            "flowgate_rejection_delivery_failures_total {}",
            self.rejection_delivery_failures
        );

        output.push_str("# HELP flowgate_active Units of work currently in flight\n");
        output.push_str("# TYPE flowgate_active gauge\n");
        let _ = writeln!(output, "flowgate_active {}", self.currently_active);

        output
    }
}

/// Thread-safe admission counters.
///
/// The in-flight gauge is not stored here: snapshots take it from the
/// concurrency limiter so the two can never disagree.
pub struct AdmissionMetrics {
    accepted: AtomicU64,
    rejected_by_rate: AtomicU64,
    rejected_by_concurrency: AtomicU64,
    completed: AtomicU64,
    rejection_delivery_failures: AtomicU64,
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdmissionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionMetrics")
            .field("accepted", &self.accepted.load(Ordering::Relaxed))
            .field("rejected_by_rate", &self.rejected_by_rate.load(Ordering::Relaxed))
            .field(
                "rejected_by_concurrency",
                &self.rejected_by_concurrency.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl AdmissionMetrics {
    /// Creates a collector with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected_by_rate: AtomicU64::new(0),
            rejected_by_concurrency: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            rejection_delivery_failures: AtomicU64::new(0),
        }
    }

    /// Records an admission.
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejection with its cause.
    pub fn record_rejected(&self, cause: RejectCause) {
        match cause {
            RejectCause::Rate => self.rejected_by_rate.fetch_add(1, Ordering::Relaxed),
            RejectCause::Concurrency => {
                self.rejected_by_concurrency.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    /// Records the release of an admitted unit.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejection payload that could not be delivered.
    pub fn record_delivery_failure(&self) {
        self.rejection_delivery_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a snapshot, using `currently_active` for the in-flight gauge.
    #[must_use]
    pub fn snapshot(&self, currently_active: u32) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_by_rate: self.rejected_by_rate.load(Ordering::Relaxed),
            rejected_by_concurrency: self.rejected_by_concurrency.load(Ordering::Relaxed),
            currently_active,
            completed: self.completed.load(Ordering::Relaxed),
            rejection_delivery_failures: self.rejection_delivery_failures.load(Ordering::Relaxed),
        }
    }
}
