//! # Logging
//!
//! `tracing` subscriber setup.
//!
//! `RUST_LOG` takes precedence; otherwise the configured `LOG_LEVEL` applies to
//! this crate and `warn` to everything else, so kube and hyper stay quiet.

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Filter directive for a `LOG_LEVEL` value such as `INFO` or `debug`
#[must_use]
pub fn default_directive(log_level: &str) -> String {
    let level = match log_level.trim().to_ascii_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace") => level.to_string(),
        _ => "info".to_string(),
    };
    format!("warn,generic_secrets_controller={level}")
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(
    log_level: &str,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init(),
        LogFormat::Text => builder.with_target(true).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(
            default_directive("DEBUG"),
            "warn,generic_secrets_controller=debug"
        );
        assert_eq!(
            default_directive("verbose"),
            "warn,generic_secrets_controller=info"
        );
    }
}
