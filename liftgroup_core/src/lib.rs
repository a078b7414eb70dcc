//! Liftgroup Core - group control for a bank of lifts
//!
//! This library coordinates several lifts serving one building:
//! 1. **Motion**: trapezoidal kinematics that can be re-planned mid-trip
//! 2. **Dispatch**: SCAN target selection inside each lift, serialized
//!    passenger offers across lifts
//! 3. **Ledger**: one authoritative passenger table with a full timeline
//!    for every trip

pub mod boarding;
pub mod dispatch;
pub mod events;
pub mod floors;
pub mod lift;
pub mod metrics;
pub mod motion;
pub mod passengers;
pub mod scan;
pub mod validation;

// Re-export key types for convenience
pub use boarding::BoardingModel;
pub use dispatch::{DeclineReason, LiftHandle, OfferReply, ReassignRequest};
pub use events::{EventKind, LiftEvent};
pub use floors::{Floor, FloorError, FloorRegistry};
pub use lift::{Lift, LiftConfig, LiftError, LiftPhase, LiftStatus};
pub use metrics::{LedgerSummary, PassengerRecord};
pub use motion::{Direction, KinematicState, MotionError, MovementModel, Trajectory};
pub use passengers::{Passenger, PassengerError, PassengerRegistry, PassengerStatus};
pub use validation::{check_invariants, InvariantReport};
