use std::fmt;

use keeper_config::InstallLayout;

use crate::supervisor::SupervisorPhase;

/// File the init subcommand writes inside a usable repository.
const REPO_CONFIG_FILE: &str = "config";

/// Observable state of the managed daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// No installation is configured or the binary is absent.
    NotInstalled,
    /// The binary exists but the repository directory does not.
    Installed,
    /// The repository directory exists without its configuration file.
    RepoUninitialized,
    /// Binary and repository are ready; no daemon has been started.
    RepoReady,
    /// A daemon was spawned and readiness is pending.
    Starting,
    /// The daemon is ready and configured.
    Running,
    /// The daemon was stopped or exited.
    Stopped,
    /// The last start attempt failed.
    Failed,
}

impl DaemonState {
    /// Combines the supervisor phase with filesystem checks.
    pub(super) fn derive(phase: SupervisorPhase, layout: Option<&InstallLayout>) -> Self {
        match phase {
            SupervisorPhase::Starting => Self::Starting,
            SupervisorPhase::Running | SupervisorPhase::Stopping => Self::Running,
            SupervisorPhase::Stopped => Self::Stopped,
            SupervisorPhase::Failed => Self::Failed,
            SupervisorPhase::Idle => Self::from_filesystem(layout),
        }
    }

    fn from_filesystem(layout: Option<&InstallLayout>) -> Self {
        let Some(layout) = layout else {
            return Self::NotInstalled;
        };
        if !layout.binary_path().is_file() {
            return Self::NotInstalled;
        }
        let repo = layout.repo_path();
        if !repo.is_dir() {
            Self::Installed
        } else if !repo.join(REPO_CONFIG_FILE).is_file() {
            Self::RepoUninitialized
        } else {
            Self::RepoReady
        }
    }

    /// Stable lowercase name used in status messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::Installed => "installed",
            Self::RepoUninitialized => "repo_uninitialized",
            Self::RepoReady => "repo_ready",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
