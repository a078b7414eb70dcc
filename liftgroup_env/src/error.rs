//! Error types for the liftgroup environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The receiving side of a mailbox is gone (actor shut down)
    #[error("Mailbox closed: {0}")]
    MailboxClosed(String),

    /// A reply was never sent because the responder dropped the channel
    #[error("Reply dropped: {0}")]
    ReplyDropped(String),

    /// No reply within the allowed time
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a mailbox-closed error.
    pub fn closed(owner: impl std::fmt::Display) -> Self {
        Self::MailboxClosed(owner.to_string())
    }

    /// Creates a reply-dropped error.
    pub fn reply_dropped(owner: impl std::fmt::Display) -> Self {
        Self::ReplyDropped(owner.to_string())
    }
}
