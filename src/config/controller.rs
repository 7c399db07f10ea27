//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Kubernetes DNS cluster domain
    /// Used for the `<svc>.<ns>.svc.<domain>` SAN of every service name
    pub cluster_domain: String,
    /// Field manager recorded on Secret creates and patches
    pub field_manager: String,
    /// Namespace to watch for SecretClaims (None = all namespaces)
    pub watch_namespace: Option<String>,
    /// Per-item exponential backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Per-item exponential backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Overall requeue rate limit (items per second)
    pub rate_limit_qps: f64,
    /// Overall requeue burst size
    pub rate_limit_burst: u32,
    /// How often every cached claim is re-enqueued (seconds, 0 disables)
    pub resync_interval_secs: u64,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            watch_namespace: None,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            rate_limit_qps: DEFAULT_RATE_LIMIT_QPS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// `from_env` uses the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        Self {
            cluster_domain: var_or_default_str(&lookup, "CLUSTER_DOMAIN", DEFAULT_CLUSTER_DOMAIN),
            field_manager: var_or_default_str(&lookup, "FIELD_MANAGER", DEFAULT_FIELD_MANAGER),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            backoff_start_ms: var_or_default(&lookup, "BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: var_or_default(&lookup, "BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            rate_limit_qps: var_or_default(&lookup, "RATE_LIMIT_QPS", DEFAULT_RATE_LIMIT_QPS),
            rate_limit_burst: var_or_default(&lookup, "RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST),
            resync_interval_secs: var_or_default(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: LogFormat::parse(&var_or_default_str(&lookup, "LOG_FORMAT", "json")),
        }
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get resync interval, `None` when resync is disabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

/// Read a variable or return default value
fn var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a variable as string or return default
fn var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
