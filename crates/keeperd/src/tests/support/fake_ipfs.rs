//! Scripted stand-in for the `ipfs` executable.
//!
//! The script appends every invocation, with its `IPFS_PATH`, to a log file so
//! tests can count daemon spawns and check the environment contract.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Behaviour of the `daemon` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DaemonBehaviour {
    /// Prints the readiness marker and runs until interrupted.
    Ready,
    /// Like [`Self::Ready`] but pauses before printing the marker.
    SlowReady,
    /// Prints diagnostics and exits without the marker.
    ExitsWithoutMarker,
    /// Like [`Self::ExitsWithoutMarker`] but pauses before failing.
    SlowExit,
    /// Runs forever without printing the marker.
    NeverReady,
}

impl DaemonBehaviour {
    const fn body(self) -> &'static str {
        match self {
            Self::Ready => {
                "echo 'Initializing daemon...'\n    echo 'Daemon is ready'\n    trap 'exit 0' INT TERM\n    while true; do sleep 0.05; done"
            }
            Self::SlowReady => {
                "echo 'Initializing daemon...'\n    sleep 0.5\n    echo 'Daemon is ready'\n    trap 'exit 0' INT TERM\n    while true; do sleep 0.05; done"
            }
            Self::ExitsWithoutMarker => {
                "echo 'Error: cannot acquire lock'\n    echo 'repo.lock held by another process' >&2\n    exit 3"
            }
            Self::SlowExit => {
                "echo 'Initializing daemon...'\n    sleep 1\n    echo 'Error: cannot acquire lock'\n    exit 3"
            }
            Self::NeverReady => "echo 'Initializing daemon...'\n    while true; do sleep 0.05; done",
        }
    }
}

/// Options controlling the generated script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScriptOptions {
    pub(crate) daemon: DaemonBehaviour,
    pub(crate) config_fails: bool,
    pub(crate) init_writes_stderr: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            daemon: DaemonBehaviour::Ready,
            config_fails: false,
            init_writes_stderr: false,
        }
    }
}

/// Renders the shell script, logging invocations to `log`.
pub(crate) fn script(log: &Path, options: ScriptOptions) -> String {
    let init = if options.init_writes_stderr {
        "echo 'Error: ipfs configuration file already exists!' >&2\n    exit 1"
    } else {
        "mkdir -p \"$IPFS_PATH\" && echo '{}' > \"$IPFS_PATH/config\"\n    echo \"initializing IPFS node at $IPFS_PATH\""
    };
    let config = if options.config_fails {
        "echo 'Error: failed to set config value' >&2\n    exit 1"
    } else {
        "exit 0"
    };
    format!(
        "#!/bin/sh\necho \"$1 IPFS_PATH=$IPFS_PATH\" >> '{log}'\ncase \"$1\" in\n  init)\n    {init}\n    ;;\n  config)\n    {config}\n    ;;\n  daemon)\n    {daemon}\n    ;;\n  *)\n    echo \"unknown command $1\" >&2\n    exit 1\n    ;;\nesac\n",
        log = log.display(),
        daemon = options.daemon.body(),
    )
}

/// Reads the invocation log written by [`script`].
pub(crate) fn read_invocations(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .map(|text| text.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Counts `daemon` invocations in the log.
pub(crate) fn count_daemon_spawns(log: &Path) -> usize {
    read_invocations(log)
        .iter()
        .filter(|line| line.starts_with("daemon "))
        .count()
}

/// A fake binary and repository inside a scratch directory.
pub(crate) struct FakeIpfs {
    dir: TempDir,
    binary: PathBuf,
    log: PathBuf,
}

impl FakeIpfs {
    /// Writes an executable fake binary with `options`.
    pub(crate) fn install(options: ScriptOptions) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let log = dir.path().join("invocations.log");
        let binary = dir.path().join("ipfs");
        fs::write(&binary, script(&log, options)).expect("write fake binary");
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))
            .expect("make fake binary executable");
        fs::create_dir_all(dir.path().join(".ipfs")).expect("create repo");
        Self { dir, binary, log }
    }

    /// Fake binary with the given daemon behaviour and default options.
    pub(crate) fn with_daemon(daemon: DaemonBehaviour) -> Self {
        Self::install(ScriptOptions {
            daemon,
            ..ScriptOptions::default()
        })
    }

    pub(crate) fn binary(&self) -> &Path {
        &self.binary
    }

    pub(crate) fn repo(&self) -> PathBuf {
        self.dir.path().join(".ipfs")
    }

    pub(crate) fn invocations(&self) -> Vec<String> {
        read_invocations(&self.log)
    }

    pub(crate) fn daemon_spawns(&self) -> usize {
        count_daemon_spawns(&self.log)
    }
}
