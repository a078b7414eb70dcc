//! Text event stream for live display.

use liftgroup_env::{FloorId, LiftId, PassengerId};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::motion::Direction;

/// Something that happened in the building, stamped with simulation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiftEvent {
    pub at: Duration,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventKind {
    PassengerArrived {
        passenger: PassengerId,
        source: FloorId,
        target: FloorId,
    },
    Dispatched {
        passenger: PassengerId,
        lift: LiftId,
    },
    /// Every candidate declined; the passenger keeps waiting
    Unassigned { passenger: PassengerId },
    Departed {
        lift: LiftId,
        from: FloorId,
        to: FloorId,
        eta_secs: f64,
    },
    Redirected {
        lift: LiftId,
        from: FloorId,
        to: FloorId,
        remaining_secs: f64,
    },
    LiftArrived {
        lift: LiftId,
        floor: FloorId,
        direction: Direction,
    },
    Boarded {
        passenger: PassengerId,
        lift: LiftId,
        floor: FloorId,
    },
    Alighted {
        passenger: PassengerId,
        lift: LiftId,
        floor: FloorId,
    },
    ClaimsReleased {
        lift: LiftId,
        floor: FloorId,
        passengers: Vec<PassengerId>,
    },
    LiftIdle { lift: LiftId, floor: FloorId },
}

impl fmt::Display for LiftEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>8.2}s] ", self.at.as_secs_f64())?;
        match &self.kind {
            EventKind::PassengerArrived {
                passenger,
                source,
                target,
            } => write!(f, "{} waiting at {} for {}", passenger, source, target),
            EventKind::Dispatched { passenger, lift } => {
                write!(f, "{} dispatched to {}", passenger, lift)
            }
            EventKind::Unassigned { passenger } => write!(f, "{} left unassigned", passenger),
            EventKind::Departed {
                lift,
                from,
                to,
                eta_secs,
            } => write!(f, "{} departs {} for {} (eta {:.2}s)", lift, from, to, eta_secs),
            EventKind::Redirected {
                lift,
                from,
                to,
                remaining_secs,
            } => write!(
                f,
                "{} redirected from {} to {} ({:.2}s remaining)",
                lift, from, to, remaining_secs
            ),
            EventKind::LiftArrived {
                lift,
                floor,
                direction,
            } => write!(f, "{} at {} heading {}", lift, floor, direction),
            EventKind::Boarded {
                passenger,
                lift,
                floor,
            } => write!(f, "{} boards {} at {}", passenger, lift, floor),
            EventKind::Alighted {
                passenger,
                lift,
                floor,
            } => write!(f, "{} leaves {} at {}", passenger, lift, floor),
            EventKind::ClaimsReleased {
                lift,
                floor,
                passengers,
            } => write!(f, "{} released {} claim(s) at {}", lift, passengers.len(), floor),
            EventKind::LiftIdle { lift, floor } => write!(f, "{} idle at {}", lift, floor),
        }
    }
}
