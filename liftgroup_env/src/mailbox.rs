//! FIFO mailboxes connecting actors.
//!
//! Each lift owns one [`Mailbox`]; the passenger registry keeps the
//! matching [`MailboxSender`]. Messages are delivered in the order they
//! were sent.
//!
//! ```text
//! Registry                     Mailbox                      Lift
//!   |                            |                           |
//!   |-- send(Offer) ------------>|                           |
//!   |                            |-- recv() -> Offer ------->|
//!   |<----------------------------------- reply (oneshot) ---|
//! ```

use crate::error::EnvError;
use tokio::sync::mpsc;

/// Creates a connected sender/receiver pair owned by `owner`.
///
/// The owner name only shows up in error messages.
pub fn mailbox<M>(owner: impl Into<String>) -> (MailboxSender<M>, Mailbox<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let owner = owner.into();
    (
        MailboxSender {
            owner: owner.clone(),
            tx,
        },
        Mailbox { owner, rx },
    )
}

/// Sending half of a mailbox. Cheap to clone.
#[derive(Debug)]
pub struct MailboxSender<M> {
    owner: String,
    tx: mpsc::UnboundedSender<M>,
}

impl<M> Clone for MailboxSender<M> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<M> MailboxSender<M> {
    /// Queues a message without waiting.
    ///
    /// # Returns
    /// * `Ok(())` - Message queued behind earlier ones
    /// * `Err(EnvError::MailboxClosed)` - The receiving actor has stopped
    pub fn send(&self, message: M) -> Result<(), EnvError> {
        self.tx
            .send(message)
            .map_err(|_| EnvError::closed(&self.owner))
    }

    /// Returns the name of the actor this mailbox belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns true once the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a mailbox.
#[derive(Debug)]
pub struct Mailbox<M> {
    owner: String,
    rx: mpsc::UnboundedReceiver<M>,
}

impl<M> Mailbox<M> {
    /// Waits for the next message.
    ///
    /// Returns `None` once every sender has been dropped.
    /// Cancel-safe, so it can sit in a `tokio::select!` branch.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    /// Returns the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<M> {
        self.rx.try_recv().ok()
    }

    /// Returns the name of the actor that owns this mailbox.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}
