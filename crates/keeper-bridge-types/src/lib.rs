//! Wire types exchanged between a host application and `keeperd`.
//!
//! The bridge speaks JSON lines. Each request names an action and carries a
//! JSON argument array; each response echoes the request id and reports either
//! success or an error message. The types are shared so host-side tooling can
//! produce and consume the same envelopes the daemon keeper does.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action request sent by the host.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BridgeRequest {
    /// Correlation id echoed in the response.
    #[serde(default)]
    pub id: Option<u64>,
    /// Action name, for example `init`, `start`, `stop`, or `status`.
    pub action: String,
    /// Positional arguments forwarded to the action handler.
    #[serde(default = "empty_args")]
    pub args: Value,
}

const fn empty_args() -> Value {
    Value::Array(Vec::new())
}

impl BridgeRequest {
    /// Builds a request without arguments.
    #[must_use]
    pub fn new(id: Option<u64>, action: impl Into<String>) -> Self {
        Self {
            id,
            action: action.into(),
            args: empty_args(),
        }
    }

    /// Replaces the argument payload.
    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    /// Returns the action name without surrounding whitespace.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.trim()
    }
}

/// Outcome reported for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    /// The action completed successfully.
    Ok,
    /// The action failed or was not recognised.
    Error,
}

/// Response written back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BridgeResponse {
    /// Id copied from the originating request; `null` when unparseable.
    pub id: Option<u64>,
    /// Success or failure.
    pub status: BridgeStatus,
    /// Human-readable outcome.
    pub message: String,
}

impl BridgeResponse {
    /// Builds a success response.
    #[must_use]
    pub fn ok(id: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            id,
            status: BridgeStatus::Ok,
            message: message.into(),
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn error(id: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            id,
            status: BridgeStatus::Error,
            message: message.into(),
        }
    }

    /// Whether the response reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == BridgeStatus::Ok
    }
}
