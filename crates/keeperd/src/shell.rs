//! One-shot command execution with captured output.
//!
//! The executor never inherits the host environment: callers describe the
//! complete environment, which keeps the repository variable from leaking in
//! or out by accident. Both pipes are drained concurrently before waiting so a
//! chatty child cannot block on a full pipe buffer.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use thiserror::Error;
use tracing::{debug, warn};

use keeper_config::REPO_ENV_VAR;

pub(crate) const SHELL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shell");

/// Host variables forwarded to every binary invocation.
const PASSTHROUGH_VARS: [&str; 2] = ["PATH", "HOME"];

/// Complete environment handed to a child process.
pub type CommandEnv = BTreeMap<String, String>;

/// Builds the environment for any invocation of the installed binary.
///
/// The repository variable is always present; `PATH` and `HOME` are copied
/// from the host when set.
#[must_use]
pub fn binary_env(repo_path: &Path) -> CommandEnv {
    let mut env = CommandEnv::new();
    for key in PASSTHROUGH_VARS {
        if let Ok(value) = std::env::var(key) {
            env.insert(key.to_owned(), value);
        }
    }
    env.insert(
        REPO_ENV_VAR.to_owned(),
        repo_path.to_string_lossy().into_owned(),
    );
    env
}

/// Captured result of a completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    /// Lines written to stdout, without terminators.
    pub stdout_lines: Vec<String>,
    /// Lines written to stderr, without terminators.
    pub stderr_lines: Vec<String>,
    /// Exit code, or `None` when the process ended through a signal.
    pub exit_code: Option<i32>,
}

impl ShellOutput {
    /// Whether the process exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Errors raised while running an external command.
#[derive(Debug, Error)]
pub enum ShellError {
    /// No program was supplied.
    #[error("cannot run an empty command")]
    EmptyCommand,
    /// The executable could not be launched.
    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },
    /// The command wrote to stderr while stderr was treated as failure.
    #[error("{}", captured.join("\n"))]
    NonEmptyStderr {
        program: String,
        captured: Vec<String>,
        exit_code: Option<i32>,
    },
    /// Waiting for the process to exit failed.
    #[error("interrupted while waiting for '{program}': {source}")]
    WaitInterrupted {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Reading the child's output streams failed.
    #[error("failed to read output of '{program}': {source}")]
    ReadOutput {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Runs external commands to completion.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` with exactly `env` as its environment.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::NonEmptyStderr`] when `fail_on_stderr` is set and
    /// the command wrote anything to stderr, after the process has exited.
    fn run(
        &self,
        command: &[OsString],
        env: &CommandEnv,
        fail_on_stderr: bool,
    ) -> Result<ShellOutput, ShellError>;
}

/// [`CommandRunner`] backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl ShellExecutor {
    /// Builds an executor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CommandRunner for ShellExecutor {
    fn run(
        &self,
        command: &[OsString],
        env: &CommandEnv,
        fail_on_stderr: bool,
    ) -> Result<ShellOutput, ShellError> {
        let (program, args) = command.split_first().ok_or(ShellError::EmptyCommand)?;
        let program_name = program.to_string_lossy().into_owned();
        debug!(target: SHELL_TARGET, program = %program_name, args = ?args, "running command");

        let mut child = Command::new(program)
            .args(args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ShellError::SpawnFailed {
                program: program_name.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout_result, stderr_result) = thread::scope(|scope| {
            let stderr_reader = scope.spawn(move || stderr.map_or_else(|| Ok(Vec::new()), read_lines));
            let stdout_result = stdout.map_or_else(|| Ok(Vec::new()), read_lines);
            let stderr_result = stderr_reader
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")));
            (stdout_result, stderr_result)
        });

        // Always reap the child, even when reading failed.
        let status = child.wait().map_err(|source| ShellError::WaitInterrupted {
            program: program_name.clone(),
            source,
        })?;
        let read_error = |source: io::Error| ShellError::ReadOutput {
            program: program_name.clone(),
            source,
        };
        let stdout_lines = stdout_result.map_err(read_error)?;
        let stderr_lines = stderr_result.map_err(read_error)?;
        let exit_code = status.code();

        for line in &stderr_lines {
            warn!(target: SHELL_TARGET, program = %program_name, line = %line, "command stderr");
        }
        debug!(
            target: SHELL_TARGET,
            program = %program_name,
            exit_code = ?exit_code,
            stdout_lines = stdout_lines.len(),
            "command finished"
        );

        if fail_on_stderr && !stderr_lines.is_empty() {
            return Err(ShellError::NonEmptyStderr {
                program: program_name,
                captured: stderr_lines,
                exit_code,
            });
        }

        Ok(ShellOutput {
            stdout_lines,
            stderr_lines,
            exit_code,
        })
    }
}

/// Reads a stream to EOF, splitting it into lossily decoded lines.
pub(crate) fn read_lines<R: Read>(reader: R) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(lines);
        }
        lines.push(decode_line(&buffer));
    }
}

/// Decodes one raw line and strips its terminator.
pub(crate) fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.trim_end_matches(['\n', '\r']).to_owned()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn sh(script: &str) -> Vec<OsString> {
        vec!["/bin/sh".into(), "-c".into(), script.into()]
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let output = ShellExecutor::new()
            .run(&sh("echo one; echo two; exit 3"), &CommandEnv::new(), false)
            .expect("command should run");
        assert_eq!(output.stdout_lines, vec!["one", "two"]);
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.succeeded());
    }

    #[test]
    fn environment_replaces_host_environment() {
        let mut env = CommandEnv::new();
        env.insert("ONLY_VAR".to_owned(), "set".to_owned());
        let output = ShellExecutor::new()
            .run(&sh("echo \"$ONLY_VAR:${HOME:-unset}\""), &env, false)
            .expect("command should run");
        assert_eq!(output.stdout_lines, vec!["set:unset"]);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn stderr_fails_only_when_requested(#[case] fail_on_stderr: bool) {
        let result = ShellExecutor::new().run(
            &sh("echo warning >&2; echo done"),
            &CommandEnv::new(),
            fail_on_stderr,
        );
        if fail_on_stderr {
            match result {
                Err(ShellError::NonEmptyStderr {
                    captured,
                    exit_code,
                    ..
                }) => {
                    assert_eq!(captured, vec!["warning"]);
                    assert_eq!(exit_code, Some(0));
                }
                other => panic!("expected stderr failure, got {other:?}"),
            }
        } else {
            let output = result.expect("stderr should only be logged");
            assert_eq!(output.stderr_lines, vec!["warning"]);
            assert_eq!(output.stdout_lines, vec!["done"]);
        }
    }

    #[test]
    fn drains_large_output_without_deadlock() {
        let script = "i=0; while [ $i -lt 20000 ]; do echo line $i; echo err $i >&2; i=$((i+1)); done";
        let output = ShellExecutor::new()
            .run(&sh(script), &CommandEnv::new(), false)
            .expect("command should run");
        assert_eq!(output.stdout_lines.len(), 20_000);
        assert_eq!(output.stderr_lines.len(), 20_000);
    }

    #[test]
    fn reports_spawn_failures() {
        let result = ShellExecutor::new().run(
            &[OsString::from("/nonexistent/keeper-binary")],
            &CommandEnv::new(),
            false,
        );
        assert!(matches!(result, Err(ShellError::SpawnFailed { .. })));
    }

    #[test]
    fn rejects_empty_commands() {
        let result = ShellExecutor::new().run(&[], &CommandEnv::new(), false);
        assert!(matches!(result, Err(ShellError::EmptyCommand)));
    }

    #[test]
    fn binary_env_points_at_repository() {
        let env = binary_env(Path::new("/tmp/x/.ipfs"));
        assert_eq!(env.get(REPO_ENV_VAR).map(String::as_str), Some("/tmp/x/.ipfs"));
    }
}
