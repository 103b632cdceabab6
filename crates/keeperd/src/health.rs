//! Structured health reporting for installation and daemon lifecycle events.

use std::path::Path;
use std::sync::Arc;

use keeper_config::InstallLayout;

use crate::fetch::FetchOutcome;
use crate::lifecycle::LifecycleError;
use crate::repo::RepoOutcome;
use crate::supervisor::{StartOutcome, StopOutcome};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before an installation flow begins.
    fn init_starting(&self, layout: &InstallLayout);

    /// Invoked whenever the download percentage advances.
    fn download_progress(&self, percent: u8, downloaded: u64, total: u64);

    /// Invoked after the archive fetch completes.
    fn archive_fetched(&self, outcome: FetchOutcome);

    /// Invoked once the binary has been unpacked and made executable.
    fn binary_installed(&self, binary: &Path);

    /// Invoked after the repository step completes.
    fn repo_ready(&self, outcome: RepoOutcome);

    /// Invoked after an installation flow completes.
    fn init_succeeded(&self, layout: &InstallLayout);

    /// Invoked when an installation flow fails.
    fn init_failed(&self, error: &LifecycleError);

    /// Invoked before the daemon is started.
    fn daemon_starting(&self);

    /// Invoked after a start request succeeds.
    fn daemon_started(&self, outcome: StartOutcome);

    /// Invoked when a start request fails.
    fn daemon_start_failed(&self, error: &LifecycleError);

    /// Invoked after a stop request succeeds.
    fn daemon_stopped(&self, outcome: StopOutcome);

    /// Invoked when a stop request fails.
    fn daemon_stop_failed(&self, error: &LifecycleError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn init_starting(&self, layout: &InstallLayout) {
        (**self).init_starting(layout);
    }

    fn download_progress(&self, percent: u8, downloaded: u64, total: u64) {
        (**self).download_progress(percent, downloaded, total);
    }

    fn archive_fetched(&self, outcome: FetchOutcome) {
        (**self).archive_fetched(outcome);
    }

    fn binary_installed(&self, binary: &Path) {
        (**self).binary_installed(binary);
    }

    fn repo_ready(&self, outcome: RepoOutcome) {
        (**self).repo_ready(outcome);
    }

    fn init_succeeded(&self, layout: &InstallLayout) {
        (**self).init_succeeded(layout);
    }

    fn init_failed(&self, error: &LifecycleError) {
        (**self).init_failed(error);
    }

    fn daemon_starting(&self) {
        (**self).daemon_starting();
    }

    fn daemon_started(&self, outcome: StartOutcome) {
        (**self).daemon_started(outcome);
    }

    fn daemon_start_failed(&self, error: &LifecycleError) {
        (**self).daemon_start_failed(error);
    }

    fn daemon_stopped(&self, outcome: StopOutcome) {
        (**self).daemon_stopped(outcome);
    }

    fn daemon_stop_failed(&self, error: &LifecycleError) {
        (**self).daemon_stop_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn init_starting(&self, layout: &InstallLayout) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "init_starting",
            root = %layout.root().display(),
            "starting installation"
        );
    }

    fn download_progress(&self, percent: u8, downloaded: u64, total: u64) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "download_progress",
            percent,
            downloaded,
            total,
            "downloading archive"
        );
    }

    fn archive_fetched(&self, outcome: FetchOutcome) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "archive_fetched",
            outcome = ?outcome,
            "archive fetched"
        );
    }

    fn binary_installed(&self, binary: &Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "binary_installed",
            binary = %binary.display(),
            "daemon binary installed"
        );
    }

    fn repo_ready(&self, outcome: RepoOutcome) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "repo_ready",
            outcome = ?outcome,
            "repository ready"
        );
    }

    fn init_succeeded(&self, layout: &InstallLayout) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "init_succeeded",
            binary = %layout.binary_path().display(),
            repo = %layout.repo_path().display(),
            "installation completed"
        );
    }

    fn init_failed(&self, error: &LifecycleError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "init_failed",
            error = %error,
            "installation failed"
        );
    }

    fn daemon_starting(&self) {
        tracing::info!(target: HEALTH_TARGET, event = "daemon_starting", "starting daemon");
    }

    fn daemon_started(&self, outcome: StartOutcome) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_started",
            outcome = ?outcome,
            "daemon available"
        );
    }

    fn daemon_start_failed(&self, error: &LifecycleError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "daemon_start_failed",
            error = %error,
            "daemon failed to start"
        );
    }

    fn daemon_stopped(&self, outcome: StopOutcome) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_stopped",
            outcome = ?outcome,
            "daemon stopped"
        );
    }

    fn daemon_stop_failed(&self, error: &LifecycleError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "daemon_stop_failed",
            error = %error,
            "daemon failed to stop"
        );
    }
}
