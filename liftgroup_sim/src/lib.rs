//! Liftgroup Deterministic Simulation Harness
//!
//! Runs a whole building (floors, lifts and passengers) on a paused tokio
//! clock so every run with the same seed produces the same ledger.
//!
//! # Core Principle: One Clock, One Seed
//!
//! - **Time**: the runtime is built with `start_paused(true)`. Virtual time
//!   only advances when every lift and arrival task is waiting on a timer.
//! - **Randomness**: passenger arrivals draw from a ChaCha stream derived
//!   from the master seed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimWorld                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │ tokio current_thread runtime (paused clock)         │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  ArrivalGenerator ──► PassengerRegistry ──► Lift #1..n   │
//! │   (Poisson, seeded)    (dispatch lock,      (actor loop, │
//! │                         event bus)           mailbox)    │
//! │                              │                           │
//! │                              ▼                           │
//! │                          EventLog ──► ScenarioRunner     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use liftgroup_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Redirect);
//! assert!(result.passed);
//! ```

pub mod arrivals;
pub mod config;
mod context;
mod exporter;
mod runner;
pub mod scenarios;
mod world;

pub use arrivals::{ArrivalGenerator, TrafficProfile};
pub use config::{ConfigError, FloorLayout, SimConfig};
pub use context::{sim_epoch, SimContext};
pub use exporter::LedgerExport;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{EventLog, SimWorld, WorldError};
