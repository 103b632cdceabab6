//! Provisioning and supervision of an external IPFS daemon.
//!
//! The keeper fetches a distribution archive, unpacks the daemon binary,
//! prepares its repository, and then runs exactly one daemon process on demand.
//! A start is only reported once the daemon has printed its readiness marker
//! and its HTTP API has been opened to browser clients; a stop interrupts the
//! process and escalates to a kill after a grace period.
//!
//! [`LifecycleManager`] is the orchestration entry point. The
//! [`CommandDispatcher`] maps the host's named actions onto it, and
//! [`dispatch::bridge`] exposes the dispatcher as a JSON-lines protocol used by
//! the `keeperd` binary.

pub mod dispatch;
mod fetch;
mod health;
mod install;
mod lifecycle;
mod repo;
mod shell;
pub mod shutdown;
mod supervisor;
mod telemetry;

pub use dispatch::{Action, CommandCallback, CommandDispatcher, DispatchError, InitArgs};
pub use fetch::{ArchiveFetcher, FetchError, FetchOutcome, NoProgress, ProgressObserver};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use install::{ArchiveInstaller, ArchiveReader, InstallError, TarGzReader};
pub use lifecycle::{DaemonState, InitReport, LifecycleError, LifecycleManager};
pub use repo::{RepoInitError, RepoInitializer, RepoOutcome};
pub use shell::{CommandEnv, CommandRunner, ShellError, ShellExecutor, ShellOutput, binary_env};
pub use supervisor::{
    DaemonStartError, DaemonStopError, DaemonSupervisor, StartOutcome, StopOutcome,
    SupervisorPhase, SupervisorSettings,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
