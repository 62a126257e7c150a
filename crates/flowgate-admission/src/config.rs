//! Construction-time configuration for the admission controller.

use crate::error::{ConfigError, Result};
use crate::rejection::RejectionPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default length of a rate window: one second, i.e. "requests per second".
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Limits and rejection behavior for an [`AdmissionController`](crate::AdmissionController).
///
/// In config files the window is written as `window_ms`. Leaving
/// `max_concurrency` out means no in-flight cap; setting it to `0` is an error.
/// `max_requests_per_window = 0` disables rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum number of admitted, not yet completed units. `None` is unlimited.
    #[serde(default)]
    pub max_concurrency: Option<u32>,
    /// Maximum admissions per window. `0` disables the rate limiter.
    #[serde(default)]
    pub max_requests_per_window: u32,
    /// Length of one fixed rate window.
    #[serde(rename = "window_ms", with = "duration_ms", default = "default_window")]
    pub window: Duration,
    /// What happens to a rejected unit.
    #[serde(default)]
    pub rejection: RejectionPolicy,
}

fn default_window() -> Duration {
    DEFAULT_WINDOW
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            max_requests_per_window: 0,
            window: DEFAULT_WINDOW,
            rejection: RejectionPolicy::Drop,
        }
    }
}

impl AdmissionConfig {
    /// Creates a config with both caps set and the `Drop` policy.
    pub fn new(max_concurrency: u32, max_requests_per_window: u32, window: Duration) -> Self {
        Self {
            max_concurrency: Some(max_concurrency),
            max_requests_per_window,
            window,
            rejection: RejectionPolicy::Drop,
        }
    }

    /// Sets the in-flight cap.
    pub fn with_max_concurrency(mut self, max: u32) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Sets the per-window cap and the window length.
    pub fn with_rate(mut self, max_requests_per_window: u32, window: Duration) -> Self {
        self.max_requests_per_window = max_requests_per_window;
        self.window = window;
        self
    }

    /// Sets the rejection policy.
    pub fn with_rejection(mut self, rejection: RejectionPolicy) -> Self {
        self.rejection = rejection;
        self
    }

    /// Returns true when the rate limiter is active.
    pub fn rate_limited(&self) -> bool {
        self.max_requests_per_window > 0
    }

    /// Checks the limits, failing on values that cannot be enforced.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        if u64::try_from(self.window.as_nanos()).is_err() {
            return Err(ConfigError::WindowTooLong {
                window_ms: self.window.as_millis(),
            });
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
