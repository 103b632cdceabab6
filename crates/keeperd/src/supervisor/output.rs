//! Reader threads that follow the daemon's output streams.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{ChildStderr, ChildStdout};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::SUPERVISOR_TARGET;
use crate::shell::decode_line;

/// Maximum number of lines kept for startup failure reports.
pub(super) const CAPTURE_LIMIT: usize = 64;

/// Signals sent from the stdout reader to the starting thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StartupEvent {
    /// A line containing the readiness marker was read.
    Ready,
    /// Stdout reached end of file.
    Closed,
}

/// Bounded record of output seen before readiness.
#[derive(Debug, Default)]
pub(super) struct OutputCapture {
    lines: VecDeque<String>,
    ready: bool,
}

impl OutputCapture {
    fn record(&mut self, line: &str) {
        if self.ready {
            return;
        }
        if self.lines.len() == CAPTURE_LIMIT {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_owned());
    }

    fn mark_ready(&mut self) {
        self.ready = true;
        self.lines.clear();
    }
}

pub(super) type SharedCapture = Arc<Mutex<OutputCapture>>;

pub(super) fn snapshot(capture: &SharedCapture) -> Vec<String> {
    capture
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .lines
        .iter()
        .cloned()
        .collect()
}

fn record(capture: &SharedCapture, line: &str) {
    capture
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .record(line);
}

/// Follows stdout, announcing readiness on the first line containing `marker`.
pub(super) fn spawn_stdout_reader(
    stdout: ChildStdout,
    pid: u32,
    marker: String,
    capture: SharedCapture,
    events: Sender<StartupEvent>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("keeper-daemon-{pid}-stdout"))
        .spawn(move || {
            let mut ready = false;
            for_each_line(stdout, |line| {
                debug!(target: SUPERVISOR_TARGET, pid, stream = "stdout", line = %line, "daemon output");
                if ready {
                    return;
                }
                record(&capture, line);
                if line.contains(marker.as_str()) {
                    ready = true;
                    capture
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .mark_ready();
                    let _ = events.send(StartupEvent::Ready);
                }
            });
            let _ = events.send(StartupEvent::Closed);
        })
}

/// Follows stderr, capturing lines until readiness and logging throughout.
pub(super) fn spawn_stderr_reader(
    stderr: ChildStderr,
    pid: u32,
    capture: SharedCapture,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("keeper-daemon-{pid}-stderr"))
        .spawn(move || {
            for_each_line(stderr, |line| {
                debug!(target: SUPERVISOR_TARGET, pid, stream = "stderr", line = %line, "daemon output");
                record(&capture, line);
            });
        })
}

fn for_each_line(stream: impl Read, mut handle: impl FnMut(&str)) {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => return,
            Ok(_) => handle(&decode_line(&buffer)),
            Err(error) => {
                warn!(target: SUPERVISOR_TARGET, error = %error, "failed to read daemon output");
                return;
            }
        }
    }
}
