//! Shared configuration for the IPFS daemon keeper.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then
//! `keeper.toml` files, then `KEEPER_*` environment variables, then command
//! line flags. The crate also owns the on-disk [`InstallLayout`] so the
//! installer, repository initialiser, and supervisor agree on every path.

mod defaults;
mod installation;
mod layout;
mod logging;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_READINESS_MARKER,
    DEFAULT_STARTUP_TIMEOUT_SECS, DEFAULT_STOP_GRACE_PERIOD_MS, default_log_filter,
    default_log_filter_string, default_log_format, default_readiness_marker,
};
pub use installation::{InstallationConfig, InstallationConfigError};
pub use layout::{
    ARCHIVE_FILE_NAME, BINARY_FILE_NAME, INSTALL_DIR_NAME, InstallLayout, REPO_DIR_NAME,
    REPO_ENV_VAR,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use ortho_config::{OrthoConfig, OrthoError, OrthoResult};

/// Runtime configuration shared by the keeper library and its bridge binary.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(
    prefix = "KEEPER",
    discovery(
        app_name = "keeper",
        env_var = "KEEPER_CONFIG_PATH",
        config_file_name = "keeper.toml",
        dotfile_name = ".keeper.toml",
        config_cli_long = "config-path"
    )
)]
pub struct Config {
    /// Tracing filter expression applied to the subscriber.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Substring of a daemon output line signalling readiness.
    #[ortho_config(default = default_readiness_marker())]
    pub readiness_marker: String,
    /// Milliseconds between the interrupt and a forced kill during stop.
    #[ortho_config(default = DEFAULT_STOP_GRACE_PERIOD_MS)]
    pub stop_grace_period_ms: u64,
    /// Seconds to wait for the readiness marker; zero waits indefinitely.
    #[ortho_config(default = DEFAULT_STARTUP_TIMEOUT_SECS)]
    pub startup_timeout_secs: u64,
    /// Seconds before an archive download times out; zero disables the bound.
    #[ortho_config(default = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            readiness_marker: default_readiness_marker(),
            stop_grace_period_ms: DEFAULT_STOP_GRACE_PERIOD_MS,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Structured log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Readiness marker matched against daemon output lines.
    #[must_use]
    pub fn readiness_marker(&self) -> &str {
        self.readiness_marker.as_str()
    }

    /// Grace period granted to the daemon after the interrupt signal.
    #[must_use]
    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }

    /// Upper bound on waiting for readiness, if any.
    #[must_use]
    pub fn startup_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.startup_timeout_secs)
    }

    /// Upper bound on a single archive download, if any.
    #[must_use]
    pub fn http_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.http_timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
