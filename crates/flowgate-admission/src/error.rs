//! Configuration errors for the admission subsystem.

use thiserror::Error;

/// Errors raised while validating an [`AdmissionConfig`](crate::config::AdmissionConfig).
///
/// These only ever surface at construction time. Overload is never an error;
/// it is reported through [`Decision`](crate::controller::Decision).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_concurrency` was set to zero instead of being left unset.
    #[error("max_concurrency must be at least 1 (leave it unset for no cap)")]
    ZeroConcurrency,

    /// The rate window has no length.
    #[error("rate window must be longer than 0ms")]
    ZeroWindow,

    /// The window is too long to index with nanosecond precision.
    #[error("rate window of {window_ms}ms exceeds the supported maximum")]
    WindowTooLong {
        /// Offending window length in milliseconds.
        window_ms: u128,
    },
}

/// Result alias for admission configuration.
pub type Result<T> = std::result::Result<T, ConfigError>;
