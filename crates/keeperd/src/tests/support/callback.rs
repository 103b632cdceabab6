//! Channel-backed [`CommandCallback`] for observing asynchronous replies.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use crate::dispatch::CommandCallback;

const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// One callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    Success(String),
    Error(String),
}

impl Reply {
    pub(crate) fn message(&self) -> &str {
        match self {
            Self::Success(message) | Self::Error(message) => message,
        }
    }

    pub(crate) const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Forwards every reply into a channel.
pub(crate) struct ChannelCallback {
    sender: Sender<Reply>,
}

impl ChannelCallback {
    /// Builds a callback and the receiver observing it.
    pub(crate) fn pair() -> (Arc<Self>, Receiver<Reply>) {
        let (sender, receiver) = mpsc::channel();
        (
            Arc::new(Self { sender }),
            receiver,
        )
    }

    fn send(&self, reply: Reply) {
        let _ = self.sender.send(reply);
    }
}

impl CommandCallback for ChannelCallback {
    fn success(&self, message: &str) {
        self.send(Reply::Success(message.to_owned()));
    }

    fn error(&self, message: &str) {
        self.send(Reply::Error(message.to_owned()));
    }
}

/// Waits for the next reply, failing the test if none arrives.
pub(crate) fn next_reply(receiver: &Receiver<Reply>) -> Reply {
    receiver
        .recv_timeout(REPLY_TIMEOUT)
        .expect("callback should be invoked")
}
