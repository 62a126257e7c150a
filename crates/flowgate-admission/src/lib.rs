#![warn(missing_docs)]

//! FlowGate admission subsystem: lock-free concurrency cap, fixed-window rate
//! limiting, rejection policies and admission metrics.

pub mod clock;
pub mod concurrency;
pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod permit;
pub mod ratelimit;
pub mod rejection;

pub use clock::{Clock, ManualClock, SystemClock};
pub use concurrency::ConcurrencyLimiter;
pub use config::AdmissionConfig;
pub use controller::{AdmissionController, Decision, Rejection};
pub use error::{ConfigError, Result};
pub use metrics::{AdmissionMetrics, MetricsSnapshot, RejectCause};
pub use permit::{AdmissionPermit, CompletionReason};
pub use ratelimit::RateLimiter;
pub use rejection::{NullSink, RejectionOutcome, RejectionPolicy, ResponseSink};
