//! Maps named actions onto lifecycle operations.
//!
//! Every outcome is delivered through a [`CommandCallback`]; failures become
//! error messages and never escape as panics. `init` and `start` run on named
//! worker threads with at most one of each in flight, while `stop` and
//! `status` answer synchronously on the caller's thread. Workers are tracked
//! so [`CommandDispatcher::shutdown`] can wait for their replies.

mod arguments;
pub mod bridge;
mod errors;

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{debug, warn};

use crate::lifecycle::LifecycleManager;
use crate::supervisor::{StartOutcome, StopOutcome};

pub use arguments::InitArgs;
pub use errors::DispatchError;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Receives the outcome of one action.
pub trait CommandCallback: Send + Sync {
    /// Reports success with a human-readable message.
    fn success(&self, message: &str);
    /// Reports failure with a human-readable message.
    fn error(&self, message: &str);
}

/// Actions understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Install the binary and prepare the repository.
    Init,
    /// Launch the daemon.
    Start,
    /// Terminate the daemon.
    Stop,
    /// Report the daemon state.
    Status,
}

impl Action {
    /// Parses an action name; matching is exact.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "init" => Some(Self::Init),
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    /// Canonical action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
        }
    }
}

/// Clears an in-flight flag when the worker finishes.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Workers {
    closed: bool,
    handles: Vec<JoinHandle<()>>,
}

/// Routes bridge actions to a shared [`LifecycleManager`].
#[derive(Clone)]
pub struct CommandDispatcher {
    manager: Arc<LifecycleManager>,
    init_in_flight: Arc<AtomicBool>,
    start_in_flight: Arc<AtomicBool>,
    workers: Arc<Mutex<Workers>>,
}

impl CommandDispatcher {
    /// Builds a dispatcher around `manager`.
    #[must_use]
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self {
            manager,
            init_in_flight: Arc::new(AtomicBool::new(false)),
            start_in_flight: Arc::new(AtomicBool::new(false)),
            workers: Arc::new(Mutex::new(Workers::default())),
        }
    }

    /// Manager shared by every action.
    #[must_use]
    pub const fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    /// Executes `action`, reporting through `callback`.
    ///
    /// Returns `false` without invoking the callback when the action is not
    /// recognised.
    pub fn execute(&self, action: &str, args: &Value, callback: Arc<dyn CommandCallback>) -> bool {
        let Some(action) = Action::parse(action) else {
            debug!(target: DISPATCH_TARGET, action, "unknown action");
            return false;
        };
        debug!(target: DISPATCH_TARGET, action = action.as_str(), "dispatching action");
        match action {
            Action::Init => self.dispatch_init(args, callback),
            Action::Start => self.dispatch_start(callback),
            Action::Stop => report(callback.as_ref(), self.stop()),
            Action::Status => callback.success(&self.status()),
        }
        true
    }

    fn dispatch_init(&self, args: &Value, callback: Arc<dyn CommandCallback>) {
        let installation = match InitArgs::parse(args).and_then(InitArgs::into_installation) {
            Ok(installation) => installation,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "rejected init arguments");
                callback.error(&error.to_string());
                return;
            }
        };
        let manager = Arc::clone(&self.manager);
        self.spawn_worker(Action::Init, &self.init_in_flight, callback, move || {
            manager
                .init(&installation)
                .map(|report| report.message())
                .map_err(DispatchError::from)
        });
    }

    fn dispatch_start(&self, callback: Arc<dyn CommandCallback>) {
        let manager = Arc::clone(&self.manager);
        self.spawn_worker(Action::Start, &self.start_in_flight, callback, move || {
            manager
                .start()
                .map(describe_start)
                .map_err(DispatchError::from)
        });
    }

    fn stop(&self) -> Result<String, DispatchError> {
        self.manager
            .stop()
            .map(describe_stop)
            .map_err(DispatchError::from)
    }

    fn status(&self) -> String {
        let state = self.manager.state();
        match self.manager.pid() {
            Some(pid) => format!("{state} (pid {pid})"),
            None => state.to_string(),
        }
    }

    /// Refuses new `init` and `start` work, stops the daemon for good, and
    /// waits for running workers.
    ///
    /// Every worker has delivered its reply when this returns. A pending
    /// start is cancelled rather than awaited.
    pub fn shutdown(&self) {
        let mut workers = self.lock_workers();
        workers.closed = true;
        let pending = mem::take(&mut workers.handles);
        if let Err(error) = self.manager.shutdown() {
            warn!(target: DISPATCH_TARGET, %error, "failed to stop daemon during shutdown");
        }
        debug!(target: DISPATCH_TARGET, workers = pending.len(), "waiting for workers");
        for handle in pending {
            if handle.join().is_err() {
                warn!(target: DISPATCH_TARGET, "worker panicked");
            }
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_worker<F>(
        &self,
        action: Action,
        flag: &Arc<AtomicBool>,
        callback: Arc<dyn CommandCallback>,
        work: F,
    ) where
        F: FnOnce() -> Result<String, DispatchError> + Send + 'static,
    {
        let mut workers = self.lock_workers();
        if workers.closed {
            let error = DispatchError::ShuttingDown {
                action: action.as_str(),
            };
            warn!(target: DISPATCH_TARGET, %error, "rejected request during shutdown");
            callback.error(&error.to_string());
            return;
        }
        let Some(guard) = InFlight::claim(flag) else {
            let error = DispatchError::Busy {
                action: action.as_str(),
            };
            warn!(target: DISPATCH_TARGET, %error, "rejected concurrent request");
            callback.error(&error.to_string());
            return;
        };
        let worker_callback = Arc::clone(&callback);
        let spawned = thread::Builder::new()
            .name(format!("keeper-{}", action.as_str()))
            .spawn(move || {
                let _guard = guard;
                report(worker_callback.as_ref(), work());
            });
        match spawned {
            Ok(handle) => {
                workers.handles.retain(|running| !running.is_finished());
                workers.handles.push(handle);
            }
            Err(source) => {
                let error = DispatchError::Worker {
                    action: action.as_str(),
                    source,
                };
                warn!(target: DISPATCH_TARGET, %error, "worker spawn failed");
                callback.error(&error.to_string());
            }
        }
    }
}

fn report(callback: &dyn CommandCallback, result: Result<String, DispatchError>) {
    match result {
        Ok(message) => callback.success(&message),
        Err(error) => callback.error(&error.to_string()),
    }
}

fn describe_start(outcome: StartOutcome) -> String {
    match outcome {
        StartOutcome::Started { pid } => format!("daemon started (pid {pid})"),
        StartOutcome::AlreadyRunning { pid } => format!("daemon already running (pid {pid})"),
    }
}

fn describe_stop(outcome: StopOutcome) -> String {
    match outcome {
        StopOutcome::Stopped {
            exit_code: Some(code),
        } => format!("daemon stopped (exit code {code})"),
        StopOutcome::Stopped { exit_code: None } => {
            "daemon stopped (terminated by signal)".to_owned()
        }
        StopOutcome::AlreadyStopped => "daemon already stopped".to_owned(),
    }
}

#[cfg(test)]
mod tests;
