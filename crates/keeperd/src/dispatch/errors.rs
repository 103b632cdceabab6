//! Error types surfaced by the command dispatcher.

use std::io;

use thiserror::Error;

use keeper_config::InstallationConfigError;

use crate::lifecycle::LifecycleError;

/// Errors reported through a command callback.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The init argument object is missing or has the wrong shape.
    #[error("Invalid Config JSON Object: {message}")]
    InvalidConfig {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The init arguments parsed but failed validation.
    #[error(transparent)]
    Installation(#[from] InstallationConfigError),
    /// Another request for the same action is still running.
    #[error("{action} already in progress")]
    Busy { action: &'static str },
    /// The dispatcher is shutting down and accepts no new work.
    #[error("{action} rejected; keeper is shutting down")]
    ShuttingDown { action: &'static str },
    /// The worker thread could not be created.
    #[error("failed to spawn {action} worker: {source}")]
    Worker {
        action: &'static str,
        #[source]
        source: io::Error,
    },
    /// The lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl DispatchError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            source: None,
        }
    }
}
