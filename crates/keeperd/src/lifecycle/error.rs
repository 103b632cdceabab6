//! Error types for lifecycle orchestration.

use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchError;
use crate::install::InstallError;
use crate::repo::RepoInitError;
use crate::supervisor::{DaemonStartError, DaemonStopError};

/// Errors surfaced by [`super::LifecycleManager`] operations.
///
/// Stage failures are transparent so callers see the original message.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Downloading the archive failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Unpacking or preparing the binary failed.
    #[error(transparent)]
    Install(#[from] InstallError),
    /// Creating the repository failed.
    #[error(transparent)]
    RepoInit(#[from] RepoInitError),
    /// Starting the daemon failed.
    #[error(transparent)]
    Start(#[from] DaemonStartError),
    /// Stopping the daemon failed.
    #[error(transparent)]
    Stop(#[from] DaemonStopError),
    /// `init` was requested while the daemon is alive.
    #[error("daemon is running; stop it before running init")]
    DaemonActive,
    /// No installation has been configured in this process.
    #[error("no installation configured; run init first")]
    NotConfigured,
    /// The daemon binary is missing.
    #[error("daemon binary not found at '{path}'; run init first")]
    MissingBinary { path: PathBuf },
    /// The repository directory is missing.
    #[error("repository not found at '{path}'; run init first")]
    MissingRepo { path: PathBuf },
}
