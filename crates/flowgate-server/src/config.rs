//! Server configuration loaded from TOML or JSON files.

use crate::error::{Result, ServerError};
use flowgate_admission::AdmissionConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for the `flowgate` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// Simulated downstream handler latency, in milliseconds.
    pub handler_delay_ms: u64,
    /// How often the metrics snapshot is logged, in seconds. `0` disables it.
    pub metrics_interval_secs: u64,
    /// Admission limits applied to every request.
    pub admission: AdmissionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7878)),
            handler_delay_ms: 0,
            metrics_interval_secs: 10,
            admission: AdmissionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads a config file, choosing the format from its extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ServerConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                return Err(ServerError::UnsupportedConfig {
                    extension: ext.to_string(),
                })
            }
        };
        config.admission.validate()?;
        Ok(config)
    }

    /// Downstream handler latency as a [`Duration`].
    pub fn handler_delay(&self) -> Duration {
        Duration::from_millis(self.handler_delay_ms)
    }

    /// Metrics reporting period, `None` when reporting is off.
    pub fn metrics_interval(&self) -> Option<Duration> {
        (self.metrics_interval_secs > 0).then(|| Duration::from_secs(self.metrics_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_admission::{ConfigError, RejectionPolicy};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_values() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 7878)));
        assert_eq!(config.handler_delay(), Duration::ZERO);
        assert_eq!(config.metrics_interval(), Some(Duration::from_secs(10)));
        assert_eq!(config.admission, AdmissionConfig::default());
    }

    #[test]
    fn test_from_toml_file() {
        let file = write_config(
            ".toml",
            r#"
bind_addr = "0.0.0.0:9000"
handler_delay_ms = 25
metrics_interval_secs = 0

[admission]
max_concurrency = 10
max_requests_per_window = 100
window_ms = 1000

[admission.rejection]
mode = "respond"
payload = "429 Too Many Requests\n"
"#,
        );

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 9000)));
        assert_eq!(config.handler_delay(), Duration::from_millis(25));
        assert_eq!(config.metrics_interval(), None);
        assert_eq!(config.admission.max_concurrency, Some(10));
        assert_eq!(config.admission.max_requests_per_window, 100);
        assert_eq!(config.admission.window, Duration::from_secs(1));
        assert_eq!(
            config.admission.rejection,
            RejectionPolicy::respond("429 Too Many Requests\n")
        );
    }

    #[test]
    fn test_from_json_file() {
        let file = write_config(
            ".json",
            r#"{"admission": {"max_concurrency": 3, "rejection": {"mode": "drop"}}}"#,
        );
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.admission.max_concurrency, Some(3));
        assert_eq!(config.admission.rejection, RejectionPolicy::Drop);
        assert_eq!(config.bind_addr, ServerConfig::default().bind_addr);
    }

    #[test]
    fn test_zero_concurrency_fails_fast() {
        let file = write_config(".toml", "[admission]\nmax_concurrency = 0\n");
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ServerError::Admission(ConfigError::ZeroConcurrency)
        ));
    }

    #[test]
    fn test_zero_window_fails_fast() {
        let file = write_config(".toml", "[admission]\nwindow_ms = 0\n");
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ServerError::Admission(ConfigError::ZeroWindow)));
    }

    #[test]
    fn test_negative_limit_fails_to_parse() {
        let file = write_config(".toml", "[admission]\nmax_requests_per_window = -5\n");
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ServerError::Toml(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config(".yaml", "admission: {}\n");
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedConfig { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::from_file(Path::new("/nonexistent/flowgate.toml")).unwrap_err();
        assert!(matches!(err, ServerError::Io(_)));
    }
}
