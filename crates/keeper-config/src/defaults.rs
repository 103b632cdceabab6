/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Line fragment the IPFS daemon prints once its HTTP API is listening.
pub const DEFAULT_READINESS_MARKER: &str = "Daemon is ready";

/// Milliseconds granted between the interrupt signal and a forced kill.
pub const DEFAULT_STOP_GRACE_PERIOD_MS: u64 = 5_000;

/// Seconds to wait for the readiness marker while the daemon is alive.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 120;

/// HTTP timeout for archive downloads; zero leaves transfers unbounded.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 0;

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Owned readiness marker used by the configuration defaults.
pub fn default_readiness_marker() -> String {
    DEFAULT_READINESS_MARKER.to_owned()
}
