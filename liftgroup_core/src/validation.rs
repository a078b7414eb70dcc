//! Invariant checks over a live registry.
//!
//! Used by the scenario harness after every run and by tests. A report
//! lists every violation found instead of stopping at the first one.
//!
//! ```ignore
//! let report = validation::check_invariants(&registry);
//! assert!(report.is_ok(), "{report}");
//! ```

use liftgroup_env::{LiftContext, LiftId, PassengerId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::passengers::{Passenger, PassengerRegistry, PassengerStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Violation {
    /// Riders the lifts report + waiting + arrived != total
    Conservation {
        total: usize,
        waiting: usize,
        onboard: usize,
        arrived: usize,
    },
    OverCapacity {
        lift: LiftId,
        onboard: usize,
        capacity: usize,
    },
    /// The table and the lift disagree on who is aboard
    OnboardMismatch {
        lift: LiftId,
        registry: usize,
        published: usize,
    },
    /// Boarded or arrived without a confirmed lift
    MissingLift(PassengerId),
    /// Still holds pending claims after boarding
    StaleCandidates(PassengerId),
    /// Timestamps missing or out of order for the status
    Timeline(PassengerId),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Conservation {
                total,
                waiting,
                onboard,
                arrived,
            } => write!(
                f,
                "{} passengers but {} waiting + {} aboard lifts + {} arrived",
                total, waiting, onboard, arrived
            ),
            Violation::OverCapacity {
                lift,
                onboard,
                capacity,
            } => write!(f, "{} carries {} of {}", lift, onboard, capacity),
            Violation::OnboardMismatch {
                lift,
                registry,
                published,
            } => write!(
                f,
                "{} reports {} riders, passenger table has {}",
                lift, published, registry
            ),
            Violation::MissingLift(id) => write!(f, "{} has no confirmed lift", id),
            Violation::StaleCandidates(id) => write!(f, "{} boarded with pending claims", id),
            Violation::Timeline(id) => write!(f, "{} has an inconsistent timeline", id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvariantReport {
    pub passengers: usize,
    pub violations: Vec<Violation>,
}

impl InvariantReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for InvariantReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "{} passengers, no violations", self.passengers);
        }
        write!(f, "{} violation(s):", self.violations.len())?;
        for v in &self.violations {
            write!(f, "\n  - {}", v)?;
        }
        Ok(())
    }
}

fn timeline_ok(p: &Passenger) -> bool {
    let ordered = |a: Option<std::time::Duration>, b: Option<std::time::Duration>| match (a, b) {
        (Some(a), Some(b)) => a <= b,
        _ => true,
    };
    let shape = match p.status {
        PassengerStatus::Waiting => p.board_time.is_none() && p.arrival_time.is_none(),
        PassengerStatus::Onboard => p.board_time.is_some() && p.arrival_time.is_none(),
        PassengerStatus::Arrived => p.board_time.is_some() && p.arrival_time.is_some(),
    };
    shape
        && ordered(Some(p.trip_start), p.assigned_at)
        && ordered(Some(p.trip_start), p.board_time)
        && ordered(p.assigned_at, p.board_time)
        && ordered(p.board_time, p.arrival_time)
}

/// Checks the registry against itself and against what every lift publishes.
///
/// Lift statuses are only consistent with the table between lift steps, so
/// call this from a task that is not racing a lift (e.g. the harness before
/// shutdown).
pub fn check_invariants<Ctx: LiftContext>(registry: &PassengerRegistry<Ctx>) -> InvariantReport {
    let passengers = registry.passengers();
    let lifts: Vec<_> = registry
        .lift_handles()
        .into_iter()
        .map(|handle| (handle.id, handle.capacity, handle.status().onboard))
        .collect();
    let mut violations = Vec::new();

    let count = |status: PassengerStatus| passengers.iter().filter(|p| p.status == status).count();
    let (waiting, arrived) = (count(PassengerStatus::Waiting), count(PassengerStatus::Arrived));
    let aboard: usize = lifts.iter().map(|(_, _, onboard)| onboard).sum();
    if waiting + aboard + arrived != passengers.len() {
        violations.push(Violation::Conservation {
            total: passengers.len(),
            waiting,
            onboard: aboard,
            arrived,
        });
    }

    let mut riders: BTreeMap<LiftId, usize> = BTreeMap::new();
    for p in &passengers {
        if p.status != PassengerStatus::Waiting {
            match p.lift {
                Some(lift) if p.status == PassengerStatus::Onboard => {
                    *riders.entry(lift).or_default() += 1;
                }
                Some(_) => {}
                None => violations.push(Violation::MissingLift(p.id)),
            }
            if !p.candidates.is_empty() {
                violations.push(Violation::StaleCandidates(p.id));
            }
        }
        if !timeline_ok(p) {
            violations.push(Violation::Timeline(p.id));
        }
    }

    for (lift, capacity, published) in lifts {
        let held = riders.get(&lift).copied().unwrap_or(0);
        if held != published {
            violations.push(Violation::OnboardMismatch {
                lift,
                registry: held,
                published,
            });
        }
        let carried = held.max(published);
        if carried > capacity {
            violations.push(Violation::OverCapacity {
                lift,
                onboard: carried,
                capacity,
            });
        }
    }

    InvariantReport {
        passengers: passengers.len(),
        violations,
    }
}
