use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::shell::ShellError;

/// Errors raised while starting the daemon.
#[derive(Debug, Error)]
pub enum DaemonStartError {
    /// The daemon executable could not be launched.
    #[error("failed to spawn daemon '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A thread for reading daemon output could not be created.
    #[error("failed to start daemon output reader: {source}")]
    OutputReader {
        #[source]
        source: io::Error,
    },
    /// The process ended before printing the readiness marker.
    #[error("daemon exited before becoming ready (exit code {}){}", describe_code(*exit_code), describe_output(output))]
    ExitedBeforeReady {
        exit_code: Option<i32>,
        output: Vec<String>,
    },
    /// The readiness marker did not appear within the configured bound.
    #[error("daemon did not become ready within {}s{}", timeout.as_secs(), describe_output(output))]
    Timeout {
        timeout: Duration,
        output: Vec<String>,
    },
    /// Applying a post-start configuration patch failed; the daemon was stopped.
    #[error("failed to configure daemon key '{key}': {source}")]
    Configure {
        key: String,
        #[source]
        source: ShellError,
    },
    /// A concurrent stop request tore the daemon down during startup.
    #[error("daemon was stopped before it became ready")]
    Cancelled,
    /// Another caller's launch was still pending and did not reach readiness.
    #[error("concurrent start of daemon (pid {pid}) did not complete")]
    ConcurrentStartFailed { pid: u32 },
    /// The supervisor was shut down and launches no further daemons.
    #[error("daemon supervisor has shut down")]
    Closed,
    /// A stop request is still tearing down the previous daemon.
    #[error("daemon is shutting down; retry once it has stopped")]
    ShuttingDown,
    /// Querying the child's status failed.
    #[error("failed to query daemon status: {source}")]
    Status {
        #[source]
        source: io::Error,
    },
}

/// Errors raised while stopping the daemon.
#[derive(Debug, Error)]
pub enum DaemonStopError {
    /// Waiting for the daemon to exit failed.
    #[error("failed waiting for daemon (pid {pid}) to exit: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

pub(super) fn describe_code(exit_code: Option<i32>) -> String {
    exit_code.map_or_else(|| "unavailable".to_owned(), |code| code.to_string())
}

fn describe_output(output: &[String]) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(":\n{}", output.join("\n"))
    }
}
