//! Graceful-then-forced teardown of the daemon process.

use std::io;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::SUPERVISOR_TARGET;
use super::errors::DaemonStopError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Interrupts `child`, waits up to `grace`, then kills and reaps it.
///
/// Returns the exit status; a process that has already exited is simply
/// reaped.
pub(super) fn terminate(
    child: &mut Child,
    pid: u32,
    grace: Duration,
) -> Result<ExitStatus, DaemonStopError> {
    let wait_error = |source: io::Error| DaemonStopError::Wait { pid, source };
    if let Some(status) = child.try_wait().map_err(wait_error)? {
        debug!(target: SUPERVISOR_TARGET, pid, ?status, "daemon had already exited");
        return Ok(status);
    }

    interrupt(pid);
    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = child.try_wait().map_err(wait_error)? {
            info!(target: SUPERVISOR_TARGET, pid, ?status, "daemon exited after interrupt");
            return Ok(status);
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    warn!(
        target: SUPERVISOR_TARGET,
        pid,
        grace_ms = grace.as_millis(),
        "daemon ignored interrupt; killing"
    );
    if let Err(error) = child.kill() {
        // `InvalidInput` means the child exited between the last poll and now.
        if error.kind() != io::ErrorKind::InvalidInput {
            warn!(target: SUPERVISOR_TARGET, pid, error = %error, "failed to kill daemon");
        }
    }
    child.wait().map_err(wait_error)
}

fn interrupt(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        warn!(target: SUPERVISOR_TARGET, pid, "pid out of range for signalling");
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGINT) {
        Ok(()) => debug!(target: SUPERVISOR_TARGET, pid, "sent SIGINT to daemon"),
        Err(Errno::ESRCH) => debug!(target: SUPERVISOR_TARGET, pid, "daemon vanished before SIGINT"),
        Err(errno) => warn!(target: SUPERVISOR_TARGET, pid, error = %errno, "failed to signal daemon"),
    }
}
