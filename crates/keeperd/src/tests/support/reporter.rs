//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::path::Path;
use std::sync::Mutex;

use keeper_config::InstallLayout;

use crate::fetch::FetchOutcome;
use crate::health::HealthReporter;
use crate::lifecycle::LifecycleError;
use crate::repo::RepoOutcome;
use crate::supervisor::{StartOutcome, StopOutcome};

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    InitStarting,
    DownloadProgress(u8),
    ArchiveFetched(FetchOutcome),
    BinaryInstalled,
    RepoReady(RepoOutcome),
    InitSucceeded,
    InitFailed(String),
    DaemonStarting,
    DaemonStarted(StartOutcome),
    DaemonStartFailed(String),
    DaemonStopped(StopOutcome),
    DaemonStopFailed(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn init_starting(&self, _layout: &InstallLayout) {
        self.record(HealthEvent::InitStarting);
    }

    fn download_progress(&self, percent: u8, _downloaded: u64, _total: u64) {
        self.record(HealthEvent::DownloadProgress(percent));
    }

    fn archive_fetched(&self, outcome: FetchOutcome) {
        self.record(HealthEvent::ArchiveFetched(outcome));
    }

    fn binary_installed(&self, _binary: &Path) {
        self.record(HealthEvent::BinaryInstalled);
    }

    fn repo_ready(&self, outcome: RepoOutcome) {
        self.record(HealthEvent::RepoReady(outcome));
    }

    fn init_succeeded(&self, _layout: &InstallLayout) {
        self.record(HealthEvent::InitSucceeded);
    }

    fn init_failed(&self, error: &LifecycleError) {
        self.record(HealthEvent::InitFailed(error.to_string()));
    }

    fn daemon_starting(&self) {
        self.record(HealthEvent::DaemonStarting);
    }

    fn daemon_started(&self, outcome: StartOutcome) {
        self.record(HealthEvent::DaemonStarted(outcome));
    }

    fn daemon_start_failed(&self, error: &LifecycleError) {
        self.record(HealthEvent::DaemonStartFailed(error.to_string()));
    }

    fn daemon_stopped(&self, outcome: StopOutcome) {
        self.record(HealthEvent::DaemonStopped(outcome));
    }

    fn daemon_stop_failed(&self, error: &LifecycleError) {
        self.record(HealthEvent::DaemonStopFailed(error.to_string()));
    }
}
