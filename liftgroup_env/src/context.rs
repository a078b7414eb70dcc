//! Core environment context trait for lift actors.

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for environment interaction.
///
/// Lifts, the passenger registry and arrival sources never touch the
/// clock or an RNG directly; they go through this trait so the same code
/// runs against the real clock or against a paused simulation clock.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, OS entropy
/// - **Simulation**: `SimContext` (liftgroup_sim) - paused tokio clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Under a paused runtime the clock only advances when every task is
/// suspended, so all lifts observe one shared logical time.
#[async_trait]
pub trait LiftContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// All passenger timestamps and movement snapshots are expressed
    /// on this clock. In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time, used to stamp exported ledgers.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// Callers that must stay interruptible race this future against
    /// their inbox with `tokio::select!`.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Derives an independent random stream from a seed extension.
    ///
    /// The implementation combines the global seed with `seed_extension`
    /// so that every arrival source gets its own reproducible stream.
    ///
    /// # Arguments
    /// * `seed_extension` - A value to combine with the global seed
    fn derive_rng(&self, seed_extension: u64) -> ChaCha8Rng;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
