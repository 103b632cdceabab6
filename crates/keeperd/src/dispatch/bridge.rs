//! JSON-lines bridge between a host application and the dispatcher.
//!
//! Each input line is a [`BridgeRequest`]. Responses are written as
//! [`BridgeResponse`] lines, possibly out of order because `init` and `start`
//! answer from worker threads; hosts correlate them by `id`.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use keeper_bridge_types::{BridgeRequest, BridgeResponse};

use super::{CommandCallback, CommandDispatcher, DISPATCH_TARGET};

/// Errors raised while serving the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Reading or writing a line failed.
    #[error("bridge I/O failed: {0}")]
    Io(#[from] io::Error),
    /// A response could not be serialised.
    #[error("failed to serialise response: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialises responses onto a shared output stream.
pub struct ResponseWriter<W> {
    writer: Mutex<W>,
}

impl<W: Write> ResponseWriter<W> {
    /// Wraps `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Writes one response line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error when serialisation or writing fails.
    pub fn write(&self, response: &BridgeResponse) -> Result<(), BridgeError> {
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    fn write_logged(&self, response: &BridgeResponse) {
        if let Err(error) = self.write(response) {
            warn!(target: DISPATCH_TARGET, %error, id = ?response.id, "failed to write response");
        }
    }
}

struct ResponseCallback<W> {
    id: Option<u64>,
    writer: Arc<ResponseWriter<W>>,
}

impl<W: Write + Send> CommandCallback for ResponseCallback<W> {
    fn success(&self, message: &str) {
        self.writer.write_logged(&BridgeResponse::ok(self.id, message));
    }

    fn error(&self, message: &str) {
        self.writer
            .write_logged(&BridgeResponse::error(self.id, message));
    }
}

/// Reads requests and forwards them to a [`CommandDispatcher`].
pub struct Bridge {
    dispatcher: CommandDispatcher,
}

impl Bridge {
    /// Builds a bridge over `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Serves requests from `input` until end of input.
    ///
    /// Blank lines are ignored. Responses to worker-thread actions may still
    /// arrive after this returns; call [`Bridge::shutdown`] to wait for them.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] when reading `input` fails.
    pub fn serve<R, W>(&self, input: R, writer: &Arc<ResponseWriter<W>>) -> Result<(), BridgeError>
    where
        R: BufRead,
        W: Write + Send + 'static,
    {
        for line in input.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            self.handle_line(trimmed, writer);
        }
        debug!(target: DISPATCH_TARGET, "bridge input closed");
        Ok(())
    }

    /// Stops the daemon and waits until every pending response is written.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }

    fn handle_line<W>(&self, line: &str, writer: &Arc<ResponseWriter<W>>)
    where
        W: Write + Send + 'static,
    {
        let request: BridgeRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed request");
                writer.write_logged(&BridgeResponse::error(
                    None,
                    format!("malformed request: {error}"),
                ));
                return;
            }
        };
        let callback = Arc::new(ResponseCallback {
            id: request.id,
            writer: Arc::clone(writer),
        });
        if !self
            .dispatcher
            .execute(request.action(), &request.args, callback)
        {
            writer.write_logged(&BridgeResponse::error(
                request.id,
                format!("unknown action '{}'", request.action()),
            ));
        }
    }
}
