//! Building Metrics Module
//! =======================
//!
//! Read-only views over a running building:
//! - **Snapshots**: who is waiting on each floor, where each car is
//! - **Density**: how many passengers still have to pass each floor, per
//!   lift and for the waiting crowd
//! - **Ledger**: one record per passenger with timestamps and derived times
//!
//! Nothing here mutates the registry; every function takes a consistent
//! copy of the table and works from that.

use liftgroup_env::{FloorId, LiftContext, LiftId, PassengerId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::lift::LiftPhase;
use crate::motion::Direction;
use crate::passengers::{Passenger, PassengerRegistry, PassengerStatus};

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Waiting passengers on one floor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FloorSnapshot {
    pub floor: FloorId,
    pub waiting: usize,
    pub waiting_up: usize,
    pub waiting_down: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiftSnapshot {
    pub lift: LiftId,
    pub floor: FloorId,
    pub height: f64,
    pub direction: Direction,
    pub next_direction: Direction,
    pub target: Option<FloorId>,
    pub onboard: usize,
    pub capacity: usize,
    pub phase: LiftPhase,
}

/// Everything a display needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingSnapshot {
    pub at: Duration,
    pub floors: Vec<FloorSnapshot>,
    pub lifts: Vec<LiftSnapshot>,
}

pub fn floor_snapshots<Ctx: LiftContext>(registry: &PassengerRegistry<Ctx>) -> Vec<FloorSnapshot> {
    let mut floors: Vec<FloorSnapshot> = registry
        .floors()
        .ids()
        .map(|floor| FloorSnapshot {
            floor,
            waiting: 0,
            waiting_up: 0,
            waiting_down: 0,
        })
        .collect();

    for p in registry.passengers() {
        if p.status != PassengerStatus::Waiting {
            continue;
        }
        let Some(row) = floors.get_mut(p.current.index()) else {
            continue;
        };
        row.waiting += 1;
        match p.direction {
            Direction::Up => row.waiting_up += 1,
            Direction::Down => row.waiting_down += 1,
            Direction::Stationary => {}
        }
    }
    floors
}

pub fn lift_snapshots<Ctx: LiftContext>(registry: &PassengerRegistry<Ctx>) -> Vec<LiftSnapshot> {
    let mut lifts: Vec<LiftSnapshot> = registry
        .lift_handles()
        .iter()
        .map(|handle| {
            let status = handle.status();
            LiftSnapshot {
                lift: status.id,
                floor: status.floor,
                height: status
                    .motion
                    .as_ref()
                    .map_or(status.height, |m| m.state_at(registry.now()).height),
                direction: status.direction,
                next_direction: status.next_direction,
                target: status.target,
                onboard: status.onboard,
                capacity: status.capacity,
                phase: status.phase,
            }
        })
        .collect();
    lifts.sort_by_key(|l| l.lift);
    lifts
}

/// One line per lift, then one per floor with someone waiting.
impl fmt::Display for BuildingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:.2}s", self.at.as_secs_f64())?;
        for l in &self.lifts {
            let target = l.target.map_or_else(|| "---".to_string(), |t| t.to_string());
            write!(
                f,
                "\n  {} at {} {}->{} {}/{} {:?}",
                l.lift, l.floor, l.direction, target, l.onboard, l.capacity, l.phase
            )?;
        }
        for fl in self.floors.iter().filter(|fl| fl.waiting > 0) {
            write!(
                f,
                "\n  floor {}: {} waiting ({} up, {} down)",
                fl.floor, fl.waiting, fl.waiting_up, fl.waiting_down
            )?;
        }
        Ok(())
    }
}

pub fn snapshot<Ctx: LiftContext>(registry: &PassengerRegistry<Ctx>) -> BuildingSnapshot {
    BuildingSnapshot {
        at: registry.now(),
        floors: floor_snapshots(registry),
        lifts: lift_snapshots(registry),
    }
}

// =============================================================================
// DENSITY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DensityGroup {
    Waiting,
    Lift(LiftId),
}

impl fmt::Display for DensityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DensityGroup::Waiting => write!(f, "waiting"),
            DensityGroup::Lift(id) => write!(f, "{}", id),
        }
    }
}

/// Passengers that still have to pass `floor`, split by travel direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DensityRow {
    pub floor: FloorId,
    pub group: DensityGroup,
    pub up: usize,
    pub down: usize,
}

/// Cross-tabulates unfinished trips per (floor, group).
///
/// Rows with nothing in them are omitted.
pub fn density<Ctx: LiftContext>(registry: &PassengerRegistry<Ctx>) -> Vec<DensityRow> {
    let mut cells: BTreeMap<(FloorId, DensityGroup), (usize, usize)> = BTreeMap::new();

    for p in registry.passengers() {
        let group = match (p.status, p.lift) {
            (PassengerStatus::Waiting, _) => DensityGroup::Waiting,
            (PassengerStatus::Onboard, Some(lift)) => DensityGroup::Lift(lift),
            _ => continue,
        };
        for floor in registry.floors().ids() {
            let cell = cells.entry((floor, group)).or_default();
            if p.target > floor && p.current <= floor {
                cell.0 += 1;
            } else if p.target < floor && p.current >= floor {
                cell.1 += 1;
            }
        }
    }

    cells
        .into_iter()
        .filter(|(_, (up, down))| up + down > 0)
        .map(|((floor, group), (up, down))| DensityRow {
            floor,
            group,
            up,
            down,
        })
        .collect()
}

// =============================================================================
// LEDGER
// =============================================================================

/// One row of the passenger ledger. Times are seconds on the simulation clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassengerRecord {
    pub id: PassengerId,
    pub source: FloorId,
    pub target: FloorId,
    pub direction: Direction,
    pub status: PassengerStatus,
    pub lift: Option<LiftId>,
    pub trip_start: f64,
    pub assigned_at: Option<f64>,
    pub board_time: Option<f64>,
    pub arrival_time: Option<f64>,
    pub waiting_time: Option<f64>,
    pub time_on_lift: Option<f64>,
    pub travel_time: Option<f64>,
    pub patience_exceeded: bool,
}

impl PassengerRecord {
    pub fn from_passenger(p: &Passenger, now: Duration) -> Self {
        let secs = |d: Duration| d.as_secs_f64();
        Self {
            id: p.id,
            source: p.source,
            target: p.target,
            direction: p.direction,
            status: p.status,
            lift: p.lift,
            trip_start: secs(p.trip_start),
            assigned_at: p.assigned_at.map(secs),
            board_time: p.board_time.map(secs),
            arrival_time: p.arrival_time.map(secs),
            waiting_time: p.waiting_time().map(secs),
            time_on_lift: p.time_on_lift().map(secs),
            travel_time: p.travel_time().map(secs),
            patience_exceeded: p.patience_exceeded(now),
        }
    }
}

pub fn ledger<Ctx: LiftContext>(registry: &PassengerRegistry<Ctx>) -> Vec<PassengerRecord> {
    let now = registry.now();
    registry
        .passengers()
        .iter()
        .map(|p| PassengerRecord::from_passenger(p, now))
        .collect()
}

/// Aggregate figures over a ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub waiting: usize,
    pub onboard: usize,
    pub arrived: usize,
    pub mean_waiting_time: Option<f64>,
    pub max_waiting_time: Option<f64>,
    pub mean_time_on_lift: Option<f64>,
    pub mean_travel_time: Option<f64>,
    pub patience_exceeded: usize,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl LedgerSummary {
    pub fn from_records(records: &[PassengerRecord]) -> Self {
        let count = |status: PassengerStatus| records.iter().filter(|r| r.status == status).count();
        let waits: Vec<f64> = records.iter().filter_map(|r| r.waiting_time).collect();
        let rides: Vec<f64> = records.iter().filter_map(|r| r.time_on_lift).collect();
        let trips: Vec<f64> = records.iter().filter_map(|r| r.travel_time).collect();

        Self {
            total: records.len(),
            waiting: count(PassengerStatus::Waiting),
            onboard: count(PassengerStatus::Onboard),
            arrived: count(PassengerStatus::Arrived),
            mean_waiting_time: mean(&waits),
            max_waiting_time: waits.iter().copied().reduce(f64::max),
            mean_time_on_lift: mean(&rides),
            mean_travel_time: mean(&trips),
            patience_exceeded: records.iter().filter(|r| r.patience_exceeded).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::floors::FloorRegistry;
    use crate::motion::MovementModel;
    use approx::assert_relative_eq;
    use liftgroup_env::TokioContext;
    use std::sync::Arc;

    fn registry() -> PassengerRegistry<TokioContext> {
        PassengerRegistry::new(
            TokioContext::shared(),
            Arc::new(FloorRegistry::uniform(5, 3.0).unwrap()),
            MovementModel::default(),
        )
    }

    #[tokio::test]
    async fn test_floor_snapshot_counts_directions() {
        let registry = registry();
        registry.register_passenger(FloorId(2), FloorId(4), Duration::ZERO).unwrap();
        registry.register_passenger(FloorId(2), FloorId(0), Duration::ZERO).unwrap();
        registry.register_passenger(FloorId(2), FloorId(3), Duration::ZERO).unwrap();

        let floors = floor_snapshots(&registry);
        assert_eq!(floors.len(), 5);
        assert_eq!(
            floors[2],
            FloorSnapshot {
                floor: FloorId(2),
                waiting: 3,
                waiting_up: 2,
                waiting_down: 1,
            }
        );
        assert_eq!(floors[0].waiting, 0);
    }

    #[test]
    fn test_snapshot_display_lists_lifts_and_busy_floors() {
        let snap = BuildingSnapshot {
            at: Duration::from_millis(12_500),
            floors: vec![
                FloorSnapshot {
                    floor: FloorId(0),
                    waiting: 0,
                    waiting_up: 0,
                    waiting_down: 0,
                },
                FloorSnapshot {
                    floor: FloorId(2),
                    waiting: 3,
                    waiting_up: 2,
                    waiting_down: 1,
                },
            ],
            lifts: vec![LiftSnapshot {
                lift: LiftId(1),
                floor: FloorId(3),
                height: 9.0,
                direction: Direction::Up,
                next_direction: Direction::Up,
                target: Some(FloorId(5)),
                onboard: 2,
                capacity: 4,
                phase: LiftPhase::Moving,
            }],
        };
        assert_eq!(
            snap.to_string(),
            "t=12.50s\n  L1 at 003 U->005 2/4 Moving\n  floor 002: 3 waiting (2 up, 1 down)"
        );
    }

    #[tokio::test]
    async fn test_density_splits_waiting_and_onboard() {
        let registry = registry();
        let rider = registry.register_passenger(FloorId(0), FloorId(3), Duration::ZERO).unwrap();
        registry.register_passenger(FloorId(4), FloorId(2), Duration::ZERO).unwrap();
        registry.board_at(LiftId(1), FloorId(0), Direction::Up, 1);
        assert_eq!(registry.passenger(rider).unwrap().lift, Some(LiftId(1)));

        let rows = density(&registry);
        let up_in_lift: Vec<FloorId> = rows
            .iter()
            .filter(|r| r.group == DensityGroup::Lift(LiftId(1)))
            .map(|r| r.floor)
            .collect();
        // Still has to pass floors 0, 1 and 2 on the way to 3
        assert_eq!(up_in_lift, vec![FloorId(0), FloorId(1), FloorId(2)]);

        let down_waiting: Vec<(FloorId, usize)> = rows
            .iter()
            .filter(|r| r.group == DensityGroup::Waiting)
            .map(|r| (r.floor, r.down))
            .collect();
        assert_eq!(down_waiting, vec![(FloorId(3), 1), (FloorId(4), 1)]);
    }

    #[test]
    fn test_summary_means() {
        let floors = FloorRegistry::uniform(3, 3.0).unwrap();
        let mut done = Passenger::new(PassengerId(0), FloorId(0), FloorId(2), Duration::ZERO, &floors)
            .unwrap();
        done.status = PassengerStatus::Arrived;
        done.board_time = Some(Duration::from_secs(4));
        done.arrival_time = Some(Duration::from_secs(10));
        let waiting =
            Passenger::new(PassengerId(1), FloorId(1), FloorId(0), Duration::from_secs(2), &floors)
                .unwrap();

        let now = Duration::from_secs(400);
        let records = vec![
            PassengerRecord::from_passenger(&done, now),
            PassengerRecord::from_passenger(&waiting, now),
        ];
        let summary = LedgerSummary::from_records(&records);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.arrived, 1);
        assert_eq!(summary.waiting, 1);
        assert_relative_eq!(summary.mean_waiting_time.unwrap(), 4.0);
        assert_relative_eq!(summary.mean_time_on_lift.unwrap(), 6.0);
        assert_relative_eq!(summary.mean_travel_time.unwrap(), 10.0);
        // Still waiting after 398s
        assert_eq!(summary.patience_exceeded, 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = LedgerSummary::from_records(&[]);
        assert_eq!(summary.total, 0);
        assert!(summary.mean_waiting_time.is_none());
        assert!(summary.max_waiting_time.is_none());
    }
}
