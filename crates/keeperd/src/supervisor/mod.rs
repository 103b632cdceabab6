//! Supervision of the single long-running daemon process.
//!
//! The supervisor owns one slot guarded by a mutex. A start request spawns the
//! daemon while holding the slot, so racing callers observe the new handle and
//! report "already running" instead of launching a second process against the
//! same repository. Waiting for readiness happens outside the lock; each
//! launch carries a generation number so a start that was overtaken by a stop
//! can tell that its process is gone. Callers arriving while a launch is
//! pending wait for it to settle and share its outcome.

mod errors;
mod output;
mod terminate;

use std::ffi::OsString;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use keeper_config::Config;

use crate::shell::{CommandEnv, CommandRunner, binary_env};

pub use errors::{DaemonStartError, DaemonStopError};
use output::{SharedCapture, StartupEvent};

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Arguments enabling the daemon's experimental pub/sub support.
const DAEMON_ARGS: [&str; 2] = ["daemon", "--enable-pubsub-experiment"];

/// Post-readiness configuration opening the HTTP API to browser clients.
const CORS_PATCHES: [(&str, &str); 2] = [
    ("API.HTTPHeaders.Access-Control-Allow-Origin", r#"["*"]"#),
    (
        "API.HTTPHeaders.Access-Control-Allow-Methods",
        r#"["PUT", "GET", "POST"]"#,
    ),
];

const READINESS_POLL: Duration = Duration::from_millis(100);
const READER_JOIN_BUDGET: Duration = Duration::from_millis(250);

/// Tunables for starting and stopping the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Substring of a stdout line that signals readiness.
    pub readiness_marker: String,
    /// Bound on waiting for readiness while the daemon is alive.
    pub startup_timeout: Option<Duration>,
    /// Time between the interrupt and a forced kill.
    pub stop_grace_period: Duration,
}

impl SupervisorSettings {
    /// Extracts supervisor settings from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            readiness_marker: config.readiness_marker().to_owned(),
            startup_timeout: config.startup_timeout(),
            stop_grace_period: config.stop_grace_period(),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Lifecycle phase of the supervised daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// Nothing has been started yet.
    Idle,
    /// A process was spawned and readiness is pending.
    Starting,
    /// The daemon is ready and configured.
    Running,
    /// A stop request is tearing the daemon down.
    Stopping,
    /// The daemon was stopped or exited on its own.
    Stopped,
    /// The last start attempt failed.
    Failed,
}

/// Successful result of [`DaemonSupervisor::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new daemon was spawned, became ready, and was configured.
    Started { pid: u32 },
    /// A daemon was already starting or running; nothing was spawned.
    AlreadyRunning { pid: u32 },
}

/// Successful result of [`DaemonSupervisor::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The daemon was terminated; the code is absent when a signal ended it.
    Stopped { exit_code: Option<i32> },
    /// No live daemon existed.
    AlreadyStopped,
}

struct DaemonHandle {
    child: Child,
    pid: u32,
    generation: u64,
    capture: SharedCapture,
    readers: Vec<JoinHandle<()>>,
}

impl DaemonHandle {
    fn release_readers(self) {
        let deadline = Instant::now() + READER_JOIN_BUDGET;
        for reader in self.readers {
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if reader.is_finished() {
                if reader.join().is_err() {
                    warn!(target: SUPERVISOR_TARGET, pid = self.pid, "output reader panicked");
                }
            } else {
                debug!(target: SUPERVISOR_TARGET, pid = self.pid, "detaching output reader");
            }
        }
    }
}

struct Slot {
    phase: SupervisorPhase,
    handle: Option<DaemonHandle>,
    closed: bool,
}

impl Slot {
    fn holds(&self, generation: u64) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.generation == generation)
    }
}

enum Readiness {
    Ready,
    Closed,
    TimedOut,
    Cancelled,
}

enum GenerationStatus {
    Alive,
    Exited,
    Gone,
}

/// Owner of the at-most-one daemon process.
pub struct DaemonSupervisor {
    runner: Arc<dyn CommandRunner>,
    settings: SupervisorSettings,
    slot: Mutex<Slot>,
    settled: Condvar,
    generations: AtomicU64,
}

impl DaemonSupervisor {
    /// Builds an idle supervisor.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, settings: SupervisorSettings) -> Self {
        Self {
            runner,
            settings,
            slot: Mutex::new(Slot {
                phase: SupervisorPhase::Idle,
                handle: None,
                closed: false,
            }),
            settled: Condvar::new(),
            generations: AtomicU64::new(0),
        }
    }

    /// Starts the daemon unless one is already starting or running.
    ///
    /// Success is reported only after the readiness marker has been seen and
    /// both configuration patches have been applied. A call that finds a
    /// launch pending blocks until that launch settles.
    ///
    /// # Errors
    ///
    /// Returns an error when spawning fails, the process exits or times out
    /// before readiness, a configuration patch fails, a concurrent stop
    /// cancels the launch, a pending launch by another caller fails, or the
    /// supervisor has been shut down.
    pub fn start(&self, binary: &Path, repo: &Path) -> Result<StartOutcome, DaemonStartError> {
        let env = binary_env(repo);
        let (generation, pid, events) = {
            let mut slot = self.lock_slot();
            if slot.closed {
                return Err(DaemonStartError::Closed);
            }
            match slot.phase {
                SupervisorPhase::Stopping => return Err(DaemonStartError::ShuttingDown),
                SupervisorPhase::Starting => {
                    let pending = slot
                        .handle
                        .as_ref()
                        .map(|handle| (handle.pid, handle.generation));
                    if let Some((pid, generation)) = pending {
                        return self.await_pending(slot, pid, generation);
                    }
                }
                _ => {}
            }
            if let Some(pid) = reap_or_live_pid(&mut slot)? {
                info!(target: SUPERVISOR_TARGET, pid, "daemon already running");
                return Ok(StartOutcome::AlreadyRunning { pid });
            }

            let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
            match self.launch(binary, &env, generation) {
                Ok((handle, events)) => {
                    let pid = handle.pid;
                    slot.handle = Some(handle);
                    slot.phase = SupervisorPhase::Starting;
                    (generation, pid, events)
                }
                Err(error) => {
                    self.set_phase(&mut slot, SupervisorPhase::Failed);
                    return Err(error);
                }
            }
        };
        info!(target: SUPERVISOR_TARGET, pid, "daemon spawned; waiting for readiness");

        match self.await_readiness(generation, &events) {
            Readiness::Ready => self.configure(generation, pid, binary, &env),
            Readiness::Closed => {
                let (exit_code, output) = self.abort(generation)?;
                warn!(target: SUPERVISOR_TARGET, pid, ?exit_code, "daemon exited before readiness");
                Err(DaemonStartError::ExitedBeforeReady { exit_code, output })
            }
            Readiness::TimedOut => {
                let (_, output) = self.abort(generation)?;
                let timeout = self.settings.startup_timeout.unwrap_or_default();
                warn!(target: SUPERVISOR_TARGET, pid, timeout_secs = timeout.as_secs(), "daemon readiness timed out");
                Err(DaemonStartError::Timeout { timeout, output })
            }
            Readiness::Cancelled => Err(DaemonStartError::Cancelled),
        }
    }

    /// Stops the daemon and refuses every later start.
    ///
    /// A launch still waiting for readiness is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonStopError::Wait`] when reaping the process fails.
    pub fn shutdown(&self) -> Result<StopOutcome, DaemonStopError> {
        self.lock_slot().closed = true;
        info!(target: SUPERVISOR_TARGET, "supervisor closed to new launches");
        self.stop()
    }

    /// Stops the daemon if one is alive.
    ///
    /// Concurrent callers race for the handle; only the winner signals the
    /// process and the others report [`StopOutcome::AlreadyStopped`].
    ///
    /// # Errors
    ///
    /// Returns [`DaemonStopError::Wait`] when reaping the process fails.
    pub fn stop(&self) -> Result<StopOutcome, DaemonStopError> {
        let mut handle = {
            let mut slot = self.lock_slot();
            let Some(handle) = slot.handle.take() else {
                debug!(target: SUPERVISOR_TARGET, "stop requested with no daemon");
                return Ok(StopOutcome::AlreadyStopped);
            };
            self.set_phase(&mut slot, SupervisorPhase::Stopping);
            handle
        };

        let outcome = match handle.child.try_wait() {
            Ok(Some(status)) => {
                debug!(target: SUPERVISOR_TARGET, pid = handle.pid, ?status, "daemon had already finished");
                Ok(StopOutcome::AlreadyStopped)
            }
            _ => terminate::terminate(&mut handle.child, handle.pid, self.settings.stop_grace_period)
                .map(|status| StopOutcome::Stopped {
                    exit_code: status.code(),
                }),
        };
        let pid = handle.pid;
        handle.release_readers();

        let phase = if outcome.is_ok() {
            SupervisorPhase::Stopped
        } else {
            SupervisorPhase::Failed
        };
        self.set_phase(&mut self.lock_slot(), phase);
        if let Ok(StopOutcome::Stopped { exit_code }) = outcome {
            info!(target: SUPERVISOR_TARGET, pid, ?exit_code, "daemon stopped");
        }
        outcome
    }

    /// Whether a daemon process exists and has not produced an exit status.
    #[must_use]
    pub fn is_running(&self) -> bool {
        let mut slot = self.lock_slot();
        slot.handle
            .as_mut()
            .is_some_and(|handle| matches!(handle.child.try_wait(), Ok(None)))
    }

    /// Process id of the current daemon, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.lock_slot().handle.as_ref().map(|handle| handle.pid)
    }

    /// Current phase, noticing a running daemon that exited on its own.
    #[must_use]
    pub fn phase(&self) -> SupervisorPhase {
        let mut slot = self.lock_slot();
        if slot.phase == SupervisorPhase::Running {
            let exited = slot
                .handle
                .as_mut()
                .is_none_or(|handle| !matches!(handle.child.try_wait(), Ok(None)));
            if exited {
                warn!(target: SUPERVISOR_TARGET, "daemon exited without a stop request");
                if let Some(handle) = slot.handle.take() {
                    handle.release_readers();
                }
                slot.phase = SupervisorPhase::Stopped;
            }
        }
        slot.phase
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, slot: &mut Slot, phase: SupervisorPhase) {
        slot.phase = phase;
        self.settled.notify_all();
    }

    /// Waits for another caller's launch of `generation` to leave `Starting`.
    fn await_pending(
        &self,
        slot: MutexGuard<'_, Slot>,
        pid: u32,
        generation: u64,
    ) -> Result<StartOutcome, DaemonStartError> {
        debug!(target: SUPERVISOR_TARGET, pid, "waiting for pending start");
        let slot = self
            .settled
            .wait_while(slot, |slot| {
                slot.phase == SupervisorPhase::Starting && slot.holds(generation)
            })
            .unwrap_or_else(PoisonError::into_inner);
        if slot.phase == SupervisorPhase::Running && slot.holds(generation) {
            info!(target: SUPERVISOR_TARGET, pid, "daemon already running");
            Ok(StartOutcome::AlreadyRunning { pid })
        } else {
            Err(DaemonStartError::ConcurrentStartFailed { pid })
        }
    }

    fn launch(
        &self,
        binary: &Path,
        env: &CommandEnv,
        generation: u64,
    ) -> Result<(DaemonHandle, Receiver<StartupEvent>), DaemonStartError> {
        let mut child = Command::new(binary)
            .args(DAEMON_ARGS)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DaemonStartError::Spawn {
                path: binary.to_path_buf(),
                source,
            })?;
        let pid = child.id();
        let capture = SharedCapture::default();
        let (sender, events) = mpsc::channel();

        let readers = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => output::spawn_stdout_reader(
                stdout,
                pid,
                self.settings.readiness_marker.clone(),
                Arc::clone(&capture),
                sender,
            )
            .and_then(|stdout_reader| {
                output::spawn_stderr_reader(stderr, pid, Arc::clone(&capture))
                    .map(|stderr_reader| vec![stdout_reader, stderr_reader])
            }),
            _ => Err(std::io::Error::other("daemon output was not captured")),
        };
        let readers = match readers {
            Ok(readers) => readers,
            Err(source) => {
                if let Err(error) =
                    terminate::terminate(&mut child, pid, self.settings.stop_grace_period)
                {
                    warn!(target: SUPERVISOR_TARGET, pid, error = %error, "failed to reap daemon");
                }
                return Err(DaemonStartError::OutputReader { source });
            }
        };

        Ok((
            DaemonHandle {
                child,
                pid,
                generation,
                capture,
                readers,
            },
            events,
        ))
    }

    fn await_readiness(&self, generation: u64, events: &Receiver<StartupEvent>) -> Readiness {
        let deadline = self
            .settings
            .startup_timeout
            .map(|timeout| Instant::now() + timeout);
        loop {
            match events.recv_timeout(READINESS_POLL) {
                Ok(StartupEvent::Ready) => return Readiness::Ready,
                Ok(StartupEvent::Closed) | Err(RecvTimeoutError::Disconnected) => {
                    return Readiness::Closed;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
            match self.generation_status(generation) {
                GenerationStatus::Gone => return Readiness::Cancelled,
                // Give the reader a moment to flush a final marker line.
                GenerationStatus::Exited => {
                    return match events.recv_timeout(READINESS_POLL) {
                        Ok(StartupEvent::Ready) => Readiness::Ready,
                        _ => Readiness::Closed,
                    };
                }
                GenerationStatus::Alive => {}
            }
            if deadline.is_some_and(|limit| Instant::now() >= limit) {
                return Readiness::TimedOut;
            }
        }
    }

    fn generation_status(&self, generation: u64) -> GenerationStatus {
        let mut slot = self.lock_slot();
        match slot.handle.as_mut() {
            Some(handle) if handle.generation == generation => match handle.child.try_wait() {
                Ok(None) => GenerationStatus::Alive,
                Ok(Some(_)) | Err(_) => GenerationStatus::Exited,
            },
            _ => GenerationStatus::Gone,
        }
    }

    fn configure(
        &self,
        generation: u64,
        pid: u32,
        binary: &Path,
        env: &CommandEnv,
    ) -> Result<StartOutcome, DaemonStartError> {
        info!(target: SUPERVISOR_TARGET, pid, "daemon ready; applying configuration");
        for (key, value) in CORS_PATCHES {
            let command = [
                OsString::from(binary),
                OsString::from("config"),
                OsString::from("--json"),
                OsString::from(key),
                OsString::from(value),
            ];
            if let Err(source) = self.runner.run(&command, env, true) {
                warn!(target: SUPERVISOR_TARGET, pid, key, error = %source, "configuration patch failed");
                self.abort(generation)?;
                return Err(DaemonStartError::Configure {
                    key: key.to_owned(),
                    source,
                });
            }
        }

        let mut slot = self.lock_slot();
        if !slot.holds(generation) {
            return Err(DaemonStartError::Cancelled);
        }
        self.set_phase(&mut slot, SupervisorPhase::Running);
        info!(target: SUPERVISOR_TARGET, pid, "daemon running");
        Ok(StartOutcome::Started { pid })
    }

    /// Tears down the process from a failed launch and records the failure.
    ///
    /// Returns the exit code and captured output, or `Cancelled` when a stop
    /// request already took the handle.
    fn abort(&self, generation: u64) -> Result<(Option<i32>, Vec<String>), DaemonStartError> {
        let mut handle = {
            let mut slot = self.lock_slot();
            match slot.handle.take() {
                Some(handle) if handle.generation == generation => {
                    self.set_phase(&mut slot, SupervisorPhase::Stopping);
                    handle
                }
                other => {
                    slot.handle = other;
                    return Err(DaemonStartError::Cancelled);
                }
            }
        };

        let exit_code =
            match terminate::terminate(&mut handle.child, handle.pid, self.settings.stop_grace_period) {
                Ok(status) => status.code(),
                Err(error) => {
                    warn!(target: SUPERVISOR_TARGET, pid = handle.pid, error = %error, "failed to reap daemon");
                    None
                }
            };
        let capture = Arc::clone(&handle.capture);
        handle.release_readers();
        let output = output::snapshot(&capture);
        self.set_phase(&mut self.lock_slot(), SupervisorPhase::Failed);
        Ok((exit_code, output))
    }
}

/// Returns the pid of a live daemon, clearing the slot if it has exited.
fn reap_or_live_pid(slot: &mut Slot) -> Result<Option<u32>, DaemonStartError> {
    let Some(handle) = slot.handle.as_mut() else {
        return Ok(None);
    };
    match handle.child.try_wait() {
        Ok(None) => Ok(Some(handle.pid)),
        Ok(Some(status)) => {
            info!(target: SUPERVISOR_TARGET, pid = handle.pid, ?status, "previous daemon has exited");
            if let Some(finished) = slot.handle.take() {
                finished.release_readers();
            }
            slot.phase = SupervisorPhase::Stopped;
            Ok(None)
        }
        Err(source) => Err(DaemonStartError::Status { source }),
    }
}

impl Drop for DaemonSupervisor {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut handle) = slot.handle.take() {
            if let Err(error) =
                terminate::terminate(&mut handle.child, handle.pid, self.settings.stop_grace_period)
            {
                warn!(target: SUPERVISOR_TARGET, pid = handle.pid, error = %error, "failed to stop daemon on drop");
            }
        }
    }
}
