//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default Kubernetes DNS cluster domain used for service SANs
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Field manager recorded on every Secret create/patch
pub const DEFAULT_FIELD_MANAGER: &str = "k8s-generic-secrets";

/// Default per-item exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 5;

/// Default per-item exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1_000_000;

/// Default overall requeue rate (items per second)
pub const DEFAULT_RATE_LIMIT_QPS: f64 = 10.0;

/// Default overall requeue burst size
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;

/// Default interval at which every known claim is re-enqueued (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Random bytes per generated token (128 bit)
pub const TOKEN_LENGTH_BYTES: usize = 16;

/// Secret keys written for leaf certificates
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// Secret keys written for CA certificates, and read back when chaining
pub const CA_CERT_KEY: &str = "ca.crt";
pub const CA_PRIVATE_KEY_KEY: &str = "ca.key";

/// PEM block labels
pub const PEM_CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const PEM_PKCS8_KEY_LABEL: &str = "PRIVATE KEY";
pub const PEM_SEC1_KEY_LABEL: &str = "EC PRIVATE KEY";

/// Not-after used when `rotateEvery` is empty: 2079-12-31T23:59:59Z
pub const NEVER_EXPIRES_UNIX_SECS: i64 = 3_471_292_799;
