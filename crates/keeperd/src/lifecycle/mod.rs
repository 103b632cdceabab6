//! Orchestrates installation, repository set-up, and daemon supervision.
//!
//! The manager is the single entry point used by the bridge. `init` and
//! `start` are serialised behind one gate so an installation can never race a
//! launch against a half-written binary; `stop` bypasses the gate and can
//! therefore cancel a start that is still waiting for readiness.

mod error;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info};

use keeper_config::{Config, InstallLayout, InstallationConfig};

use crate::fetch::{ArchiveFetcher, FetchOutcome, ProgressObserver};
use crate::health::HealthReporter;
use crate::install::ArchiveInstaller;
use crate::repo::{RepoInitializer, RepoOutcome};
use crate::shell::{CommandRunner, ShellExecutor};
use crate::supervisor::{
    DaemonSupervisor, StartOutcome, StopOutcome, SupervisorPhase, SupervisorSettings,
};

pub use error::LifecycleError;
pub use state::DaemonState;

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Summary of a completed `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// Fetch result, absent when the binary was already installed.
    pub fetched: Option<FetchOutcome>,
    /// What happened to the repository.
    pub repo: RepoOutcome,
    /// Layout the installation was performed against.
    pub layout: InstallLayout,
}

impl InitReport {
    /// Human-readable summary returned to bridge callers.
    #[must_use]
    pub fn message(&self) -> String {
        let binary = if self.fetched.is_some() {
            "daemon binary was missing and has been prepared"
        } else {
            "daemon binary already installed"
        };
        let repo = match self.repo {
            RepoOutcome::Preserved => "existing repository preserved",
            RepoOutcome::Created => "repository initialised",
        };
        format!("{binary}; {repo}")
    }
}

struct ReporterProgress<'a>(&'a dyn HealthReporter);

impl ProgressObserver for ReporterProgress<'_> {
    fn on_progress(&self, percent: u8, downloaded: u64, total: u64) {
        self.0.download_progress(percent, downloaded, total);
    }
}

/// Coordinates the installer, repository initialiser, and supervisor.
pub struct LifecycleManager {
    fetcher: ArchiveFetcher,
    installer: ArchiveInstaller,
    repo: RepoInitializer,
    supervisor: DaemonSupervisor,
    reporter: Arc<dyn HealthReporter>,
    layout: RwLock<Option<InstallLayout>>,
    gate: Mutex<()>,
}

impl LifecycleManager {
    /// Builds a manager that runs subcommands on the host.
    #[must_use]
    pub fn new(config: &Config, reporter: Arc<dyn HealthReporter>) -> Self {
        Self::with_runner(config, Arc::new(ShellExecutor::new()), reporter)
    }

    /// Builds a manager around a custom command runner.
    #[must_use]
    pub fn with_runner(
        config: &Config,
        runner: Arc<dyn CommandRunner>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            fetcher: ArchiveFetcher::new(config.http_timeout()),
            installer: ArchiveInstaller::new(),
            repo: RepoInitializer::new(Arc::clone(&runner)),
            supervisor: DaemonSupervisor::new(runner, SupervisorSettings::from_config(config)),
            reporter,
            layout: RwLock::new(None),
            gate: Mutex::new(()),
        }
    }

    /// Installs the binary when absent and prepares the repository.
    ///
    /// The installation becomes the target of later `start` requests even
    /// when a stage fails.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::DaemonActive`] while a daemon is alive and
    /// the failing stage's error otherwise.
    pub fn init(&self, installation: &InstallationConfig) -> Result<InitReport, LifecycleError> {
        let _gate = self.lock_gate();
        if matches!(
            self.supervisor.phase(),
            SupervisorPhase::Starting | SupervisorPhase::Running | SupervisorPhase::Stopping
        ) {
            let error = LifecycleError::DaemonActive;
            self.reporter.init_failed(&error);
            return Err(error);
        }

        let layout = installation.layout();
        self.reporter.init_starting(&layout);
        *self.layout.write().unwrap_or_else(PoisonError::into_inner) = Some(layout.clone());

        match self.run_init(installation, layout) {
            Ok(report) => {
                self.reporter.init_succeeded(&report.layout);
                Ok(report)
            }
            Err(error) => {
                self.reporter.init_failed(&error);
                Err(error)
            }
        }
    }

    fn run_init(
        &self,
        installation: &InstallationConfig,
        layout: InstallLayout,
    ) -> Result<InitReport, LifecycleError> {
        let binary = layout.binary_path();
        let fetched = if binary.is_file() {
            info!(target: LIFECYCLE_TARGET, binary = %binary.display(), "daemon binary present; skipping download");
            None
        } else {
            let archive = layout.archive_cache_path();
            let outcome = self.fetcher.fetch(
                installation.archive_source(),
                &archive,
                &ReporterProgress(self.reporter.as_ref()),
            )?;
            self.reporter.archive_fetched(outcome);
            self.installer.install(&archive, layout.root(), &binary)?;
            self.reporter.binary_installed(&binary);
            Some(outcome)
        };

        let repo = self
            .repo
            .init_repo(installation.reset_repo(), &layout.repo_path(), &binary)?;
        self.reporter.repo_ready(repo);
        Ok(InitReport {
            fetched,
            repo,
            layout,
        })
    }

    /// Launches the daemon against the most recently initialised layout.
    ///
    /// # Errors
    ///
    /// Returns a `run init first` error when no installation is usable and the
    /// supervisor's error when the launch fails.
    pub fn start(&self) -> Result<StartOutcome, LifecycleError> {
        let _gate = self.lock_gate();
        let result = self.ready_layout().and_then(|layout| {
            self.reporter.daemon_starting();
            self.supervisor
                .start(&layout.binary_path(), &layout.repo_path())
                .map_err(LifecycleError::from)
        });
        match result {
            Ok(outcome) => {
                self.reporter.daemon_started(outcome);
                Ok(outcome)
            }
            Err(error) => {
                self.reporter.daemon_start_failed(&error);
                Err(error)
            }
        }
    }

    fn ready_layout(&self) -> Result<InstallLayout, LifecycleError> {
        let layout = self.layout().ok_or(LifecycleError::NotConfigured)?;
        let binary = layout.binary_path();
        if !binary.is_file() {
            return Err(LifecycleError::MissingBinary { path: binary });
        }
        let repo = layout.repo_path();
        if !repo.is_dir() {
            return Err(LifecycleError::MissingRepo { path: repo });
        }
        Ok(layout)
    }

    /// Stops the daemon; a no-op when none is alive.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be reaped.
    pub fn stop(&self) -> Result<StopOutcome, LifecycleError> {
        match self.supervisor.stop() {
            Ok(outcome) => {
                self.reporter.daemon_stopped(outcome);
                Ok(outcome)
            }
            Err(source) => {
                let error = LifecycleError::from(source);
                self.reporter.daemon_stop_failed(&error);
                Err(error)
            }
        }
    }

    /// Stops the daemon for good; later `start` requests are refused.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be reaped.
    pub fn shutdown(&self) -> Result<StopOutcome, LifecycleError> {
        info!(target: LIFECYCLE_TARGET, "shutting down");
        match self.supervisor.shutdown() {
            Ok(outcome) => {
                self.reporter.daemon_stopped(outcome);
                Ok(outcome)
            }
            Err(source) => {
                let error = LifecycleError::from(source);
                self.reporter.daemon_stop_failed(&error);
                Err(error)
            }
        }
    }

    /// Current daemon state.
    #[must_use]
    pub fn state(&self) -> DaemonState {
        let phase = self.supervisor.phase();
        let layout = self.layout();
        let state = DaemonState::derive(phase, layout.as_ref());
        debug!(target: LIFECYCLE_TARGET, %state, "state queried");
        state
    }

    /// Whether a daemon process is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Process id of the live daemon, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Layout recorded by the most recent `init`.
    #[must_use]
    pub fn layout(&self) -> Option<InstallLayout> {
        self.layout
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
