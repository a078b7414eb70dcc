//! liftgroup Environment Abstraction Layer
//!
//! This crate lets the lift group-control engine run unchanged in
//! **Production** (tokio wall clock) and **Simulation** (paused tokio clock,
//! seeded randomness).
//!
//! # Core Concept
//!
//! Everything that would make a run non-reproducible goes through a
//! context:
//! - Time (`now()`, `sleep()`)
//! - Task creation (`spawn()`)
//! - Randomness (`derive_rng()`)
//!
//! Lifts and the passenger registry talk to each other only through
//! FIFO mailboxes, so a whole building runs as a set of actors sharing
//! one logical clock.
//!
//! # Example
//!
//! ```ignore
//! use liftgroup_env::{LiftContext, Mailbox};
//!
//! async fn actor_loop<Ctx: LiftContext>(ctx: &Ctx, inbox: &mut Mailbox<Message>) {
//!     loop {
//!         tokio::select! {
//!             msg = inbox.recv() => handle(msg),
//!             _ = ctx.sleep(Duration::from_secs(1)) => tick(),
//!         }
//!     }
//! }
//! ```

mod context;
mod error;
mod mailbox;
mod tokio_impl;
mod types;

pub use context::LiftContext;
pub use error::EnvError;
pub use mailbox::{mailbox, Mailbox, MailboxSender};
pub use tokio_impl::TokioContext;
pub use types::{FloorId, LiftId, PassengerId};
