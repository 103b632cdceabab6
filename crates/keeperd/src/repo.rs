//! Creates the daemon repository through the binary's `init` subcommand.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::shell::{CommandRunner, ShellError, binary_env};

pub(crate) const REPO_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::repo");

/// What happened to the repository directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOutcome {
    /// An existing repository was left untouched.
    Preserved,
    /// The repository was (re)created.
    Created,
}

/// Errors raised while initialising the repository.
#[derive(Debug, Error)]
pub enum RepoInitError {
    /// The previous repository could not be removed.
    #[error("failed to remove repository '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The init subcommand failed; stderr output is reported verbatim.
    #[error(transparent)]
    Command(#[from] ShellError),
    /// The init subcommand exited unsuccessfully without writing to stderr.
    #[error("repository init exited with status {}", describe_exit(*exit_code))]
    ExitStatus { exit_code: Option<i32> },
}

fn describe_exit(exit_code: Option<i32>) -> String {
    exit_code.map_or_else(|| "unknown (terminated by signal)".to_owned(), |code| code.to_string())
}

/// Runs the one-shot repository initialisation.
#[derive(Clone)]
pub struct RepoInitializer {
    runner: Arc<dyn CommandRunner>,
}

impl RepoInitializer {
    /// Builds an initialiser that runs commands through `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Ensures a repository exists at `repo_path`.
    ///
    /// The directory is recreated when `reset_requested` is set or when it does
    /// not exist yet; otherwise it is preserved as-is. The init subcommand is
    /// never retried.
    ///
    /// # Errors
    ///
    /// Returns an error when removal fails, the subcommand writes to stderr, or
    /// it exits with a non-zero status.
    pub fn init_repo(
        &self,
        reset_requested: bool,
        repo_path: &Path,
        binary_path: &Path,
    ) -> Result<RepoOutcome, RepoInitError> {
        let exists = repo_path.exists();
        if exists && !reset_requested {
            info!(target: REPO_TARGET, path = %repo_path.display(), "preserving existing repository");
            return Ok(RepoOutcome::Preserved);
        }
        if exists {
            info!(target: REPO_TARGET, path = %repo_path.display(), "removing repository for reset");
            fs::remove_dir_all(repo_path).map_err(|source| RepoInitError::Remove {
                path: repo_path.to_path_buf(),
                source,
            })?;
        }

        let command = [OsString::from(binary_path), OsString::from("init")];
        let output = self
            .runner
            .run(&command, &binary_env(repo_path), true)?;
        if !output.succeeded() {
            return Err(RepoInitError::ExitStatus {
                exit_code: output.exit_code,
            });
        }
        info!(target: REPO_TARGET, path = %repo_path.display(), "repository initialised");
        Ok(RepoOutcome::Created)
    }
}
