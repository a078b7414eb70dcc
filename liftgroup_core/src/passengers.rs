//! Passenger records and the registry that owns them.
//!
//! The registry is the single shared table of the building. Lifts mutate
//! their own passengers through the methods here (each call is one short
//! critical section); assignment decisions across lifts go through the
//! dispatch protocol in [`crate::dispatch`].

use liftgroup_env::{mailbox, FloorId, LiftContext, LiftId, Mailbox, MailboxSender, PassengerId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::dispatch::{LiftHandle, ReassignRequest};
use crate::events::{EventKind, LiftEvent};
use crate::floors::{FloorError, FloorRegistry};
use crate::motion::{Direction, MovementModel};
use crate::scan::{Request, RequestKind, RequestSet};

/// Waits longer than this count as a timed-out trip.
pub const PATIENCE: Duration = Duration::from_secs(5 * 60);

const EVENT_BUFFER: usize = 1024;

// ============================================================================
// PASSENGER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PassengerError {
    #[error("Trip from {0} to itself")]
    SameFloor(FloorId),

    #[error(transparent)]
    Floor(#[from] FloorError),

    #[error("Unknown passenger: {0}")]
    Unknown(PassengerId),
}

/// Trip status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PassengerStatus {
    Waiting,
    Onboard,
    Arrived,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passenger {
    pub id: PassengerId,
    pub source: FloorId,
    pub target: FloorId,
    pub direction: Direction,
    /// Floor the passenger was last seen at
    pub current: FloorId,
    pub status: PassengerStatus,
    /// Lifts that have claimed this passenger but not picked them up yet
    pub candidates: BTreeSet<LiftId>,
    /// Lift the passenger actually boarded
    pub lift: Option<LiftId>,
    pub trip_start: Duration,
    pub assigned_at: Option<Duration>,
    pub board_time: Option<Duration>,
    pub arrival_time: Option<Duration>,
}

impl Passenger {
    pub fn new(
        id: PassengerId,
        source: FloorId,
        target: FloorId,
        trip_start: Duration,
        floors: &FloorRegistry,
    ) -> Result<Self, PassengerError> {
        floors.floor(source)?;
        floors.floor(target)?;
        if source == target {
            return Err(PassengerError::SameFloor(source));
        }

        Ok(Self {
            id,
            source,
            target,
            direction: if target > source {
                Direction::Up
            } else {
                Direction::Down
            },
            current: source,
            status: PassengerStatus::Waiting,
            candidates: BTreeSet::new(),
            lift: None,
            trip_start,
            assigned_at: None,
            board_time: None,
            arrival_time: None,
        })
    }

    pub fn waiting_time(&self) -> Option<Duration> {
        self.board_time.map(|b| b.saturating_sub(self.trip_start))
    }

    pub fn time_on_lift(&self) -> Option<Duration> {
        match (self.board_time, self.arrival_time) {
            (Some(board), Some(arrival)) => Some(arrival.saturating_sub(board)),
            _ => None,
        }
    }

    pub fn travel_time(&self) -> Option<Duration> {
        self.arrival_time.map(|a| a.saturating_sub(self.trip_start))
    }

    /// True when the passenger waited (or has been waiting) past [`PATIENCE`].
    pub fn patience_exceeded(&self, now: Duration) -> bool {
        let until = self.board_time.unwrap_or(now);
        until.saturating_sub(self.trip_start) > PATIENCE
    }

    /// Waiting and either unclaimed or already claimed by `lift`.
    pub fn is_claimable_by(&self, lift: LiftId) -> bool {
        self.status == PassengerStatus::Waiting
            && (self.candidates.is_empty() || self.candidates.contains(&lift))
    }
}

// ============================================================================
// RESERVATIONS
// ============================================================================

/// One claim added by a reservation, remembered so it can be undone.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub passenger: PassengerId,
    /// Whether this claim set the passenger's `assigned_at`
    pub stamped: bool,
}

/// Passengers a lift intends to pick up at one floor.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub floor: FloorId,
    pub direction: Direction,
    /// Everyone counted against capacity, including earlier claims
    pub passengers: Vec<PassengerId>,
    /// Claims this reservation added
    pub claims: Vec<Claim>,
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct PassengerTable {
    next_id: u64,
    pub(crate) passengers: BTreeMap<PassengerId, Passenger>,
}

impl PassengerTable {
    /// Waiting passengers at `floor` heading `direction`, earliest first.
    fn queue(&self, floor: FloorId, direction: Direction) -> Vec<PassengerId> {
        let mut queue: Vec<&Passenger> = self
            .passengers
            .values()
            .filter(|p| {
                p.status == PassengerStatus::Waiting && p.current == floor && p.direction == direction
            })
            .collect();
        queue.sort_by_key(|p| (p.trip_start, p.id));
        queue.into_iter().map(|p| p.id).collect()
    }
}

/// Authoritative table of every passenger that has entered the building.
pub struct PassengerRegistry<Ctx: LiftContext> {
    context: Arc<Ctx>,
    floors: Arc<FloorRegistry>,
    model: MovementModel,
    table: Mutex<PassengerTable>,
    pub(crate) lifts: RwLock<Vec<LiftHandle>>,
    /// Serializes "who gets this passenger" decisions
    pub(crate) dispatch_lock: tokio::sync::Mutex<()>,
    reassign_tx: MailboxSender<ReassignRequest>,
    pub(crate) reassign_rx: Mutex<Option<Mailbox<ReassignRequest>>>,
    events: broadcast::Sender<LiftEvent>,
}

impl<Ctx: LiftContext> PassengerRegistry<Ctx> {
    pub fn new(context: Arc<Ctx>, floors: Arc<FloorRegistry>, model: MovementModel) -> Self {
        let (reassign_tx, reassign_rx) = mailbox("reassignment");
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            context,
            floors,
            model,
            table: Mutex::new(PassengerTable::default()),
            lifts: RwLock::new(Vec::new()),
            dispatch_lock: tokio::sync::Mutex::new(()),
            reassign_tx,
            reassign_rx: Mutex::new(Some(reassign_rx)),
            events,
        }
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    pub fn floors(&self) -> &Arc<FloorRegistry> {
        &self.floors
    }

    pub fn model(&self) -> MovementModel {
        self.model
    }

    pub fn now(&self) -> Duration {
        self.context.now()
    }

    pub(crate) fn table(&self) -> MutexGuard<'_, PassengerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live event stream. Slow subscribers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<LiftEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, kind: EventKind) {
        let event = LiftEvent {
            at: self.now(),
            kind,
        };
        debug!(event = %event, "lift event");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn request_reassignment(&self, request: ReassignRequest) {
        if let Err(e) = self.reassign_tx.send(request) {
            debug!(error = %e, "reassignment listener gone");
        }
    }

    /// Adds a new Waiting passenger to the table.
    pub fn register_passenger(
        &self,
        source: FloorId,
        target: FloorId,
        trip_start: Duration,
    ) -> Result<PassengerId, PassengerError> {
        let id = {
            let mut table = self.table();
            let id = PassengerId(table.next_id);
            let passenger = Passenger::new(id, source, target, trip_start, &self.floors)?;
            table.next_id += 1;
            table.passengers.insert(id, passenger);
            id
        };
        self.emit(EventKind::PassengerArrived {
            passenger: id,
            source,
            target,
        });
        Ok(id)
    }

    // ========== Queries ==========

    pub fn passenger(&self, id: PassengerId) -> Option<Passenger> {
        self.table().passengers.get(&id).cloned()
    }

    pub fn passengers(&self) -> Vec<Passenger> {
        self.table().passengers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table().passengers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, status: PassengerStatus) -> usize {
        self.table()
            .passengers
            .values()
            .filter(|p| p.status == status)
            .count()
    }

    /// Waiting passengers nobody has claimed, grouped by floor.
    pub fn unclaimed_by_floor(&self) -> BTreeMap<FloorId, Vec<PassengerId>> {
        let mut groups: BTreeMap<FloorId, Vec<PassengerId>> = BTreeMap::new();
        for p in self.table().passengers.values() {
            if p.status == PassengerStatus::Waiting && p.candidates.is_empty() {
                groups.entry(p.current).or_default().push(p.id);
            }
        }
        groups
    }

    /// Everything `lift` could act on: its riders' destinations plus the
    /// waiting passengers no other lift holds exclusively.
    pub fn requests_for(
        &self,
        lift: LiftId,
        onboard: &BTreeSet<PassengerId>,
        include_pickups: bool,
    ) -> Result<RequestSet, FloorError> {
        let table = self.table();
        let mut requests = RequestSet::new();

        for id in onboard {
            if let Some(p) = table.passengers.get(id) {
                requests.insert(Request {
                    floor: p.target,
                    height: self.floors.height(p.target)?,
                    direction: p.direction,
                    kind: RequestKind::DropOff,
                });
            }
        }

        if include_pickups {
            for p in table.passengers.values().filter(|p| p.is_claimable_by(lift)) {
                requests.insert(Request {
                    floor: p.current,
                    height: self.floors.height(p.current)?,
                    direction: p.direction,
                    kind: RequestKind::Pickup,
                });
            }
        }

        Ok(requests)
    }

    // ========== Claims ==========

    /// Adds `lift` to a waiting passenger's candidates.
    ///
    /// Returns false when the passenger is no longer waiting.
    pub fn claim(&self, passenger: PassengerId, lift: LiftId) -> bool {
        let now = self.now();
        let mut table = self.table();
        match table.passengers.get_mut(&passenger) {
            Some(p) if p.status == PassengerStatus::Waiting => {
                p.candidates.insert(lift);
                p.assigned_at.get_or_insert(now);
                true
            }
            _ => false,
        }
    }

    /// Claims up to `spare` of the earliest passengers waiting at `floor`
    /// to travel `direction`.
    ///
    /// Without `allow_multi` only unclaimed passengers (or ones this lift
    /// already holds) qualify; with it, this lift's claim is added next to
    /// whatever other lifts hold.
    pub fn reserve(
        &self,
        lift: LiftId,
        floor: FloorId,
        direction: Direction,
        spare: usize,
        allow_multi: bool,
    ) -> Reservation {
        let now = self.now();
        let mut table = self.table();
        let mut reservation = Reservation {
            floor,
            direction,
            passengers: Vec::new(),
            claims: Vec::new(),
        };

        for id in table.queue(floor, direction) {
            if reservation.passengers.len() >= spare {
                break;
            }
            let Some(p) = table.passengers.get_mut(&id) else {
                continue;
            };
            if p.candidates.contains(&lift) {
                reservation.passengers.push(id);
                continue;
            }
            if !allow_multi && !p.candidates.is_empty() {
                continue;
            }
            p.candidates.insert(lift);
            let stamped = p.assigned_at.is_none();
            if stamped {
                p.assigned_at = Some(now);
            }
            reservation.claims.push(Claim {
                passenger: id,
                stamped,
            });
            reservation.passengers.push(id);
        }

        reservation
    }

    /// Undoes the claims a reservation added.
    ///
    /// Returns the passengers left with no claim at all.
    pub fn release(&self, lift: LiftId, reservation: &Reservation) -> Vec<PassengerId> {
        let mut table = self.table();
        let mut freed = Vec::new();

        for claim in reservation.claims.iter().rev() {
            let Some(p) = table.passengers.get_mut(&claim.passenger) else {
                continue;
            };
            if p.status != PassengerStatus::Waiting {
                continue;
            }
            p.candidates.remove(&lift);
            if claim.stamped {
                p.assigned_at = None;
            }
            if p.candidates.is_empty() {
                freed.push(p.id);
            }
        }

        freed.reverse();
        freed
    }

    /// Drops every claim `lift` holds on passengers still waiting at `floor`.
    pub fn drop_claims_at(&self, lift: LiftId, floor: FloorId) -> Vec<PassengerId> {
        let mut table = self.table();
        let mut freed = Vec::new();
        for p in table.passengers.values_mut() {
            if p.status == PassengerStatus::Waiting && p.current == floor && p.candidates.remove(&lift) {
                if p.candidates.is_empty() {
                    freed.push(p.id);
                }
            }
        }
        freed
    }

    // ========== Boarding ==========

    /// Boards up to `limit` of the earliest eligible passengers at `floor`.
    pub fn board_at(
        &self,
        lift: LiftId,
        floor: FloorId,
        direction: Direction,
        limit: usize,
    ) -> Vec<PassengerId> {
        let now = self.now();
        let boarded: Vec<PassengerId> = {
            let mut table = self.table();
            let eligible: Vec<PassengerId> = table
                .queue(floor, direction)
                .into_iter()
                .filter(|id| {
                    table
                        .passengers
                        .get(id)
                        .is_some_and(|p| p.is_claimable_by(lift))
                })
                .take(limit)
                .collect();
            for id in &eligible {
                if let Some(p) = table.passengers.get_mut(id) {
                    Self::mark_boarded(p, lift, now);
                }
            }
            eligible
        };

        for passenger in &boarded {
            self.emit(EventKind::Boarded {
                passenger: *passenger,
                lift,
                floor,
            });
        }
        boarded
    }

    /// Boards one specific passenger if they are still waiting at `floor`.
    pub fn board_passenger(
        &self,
        passenger: PassengerId,
        lift: LiftId,
        floor: FloorId,
        direction: Direction,
    ) -> bool {
        let now = self.now();
        let boarded = {
            let mut table = self.table();
            match table.passengers.get_mut(&passenger) {
                Some(p) if p.current == floor && p.direction == direction && p.is_claimable_by(lift) => {
                    Self::mark_boarded(p, lift, now);
                    true
                }
                _ => false,
            }
        };
        if boarded {
            self.emit(EventKind::Boarded {
                passenger,
                lift,
                floor,
            });
        }
        boarded
    }

    fn mark_boarded(p: &mut Passenger, lift: LiftId, now: Duration) {
        p.status = PassengerStatus::Onboard;
        p.lift = Some(lift);
        p.candidates.clear();
        p.assigned_at.get_or_insert(now);
        p.board_time = Some(now);
    }

    /// Lets off everyone in `onboard` whose destination is `floor`.
    pub fn alight(
        &self,
        lift: LiftId,
        floor: FloorId,
        onboard: &BTreeSet<PassengerId>,
    ) -> Vec<PassengerId> {
        let now = self.now();
        let alighted: Vec<PassengerId> = {
            let mut table = self.table();
            let mut alighted = Vec::new();
            for id in onboard {
                if let Some(p) = table.passengers.get_mut(id) {
                    if p.status == PassengerStatus::Onboard && p.target == floor {
                        p.status = PassengerStatus::Arrived;
                        p.current = floor;
                        p.arrival_time = Some(now);
                        alighted.push(p.id);
                    }
                }
            }
            alighted
        };

        for passenger in &alighted {
            self.emit(EventKind::Alighted {
                passenger: *passenger,
                lift,
                floor,
            });
        }
        alighted
    }

    /// Moves riders along with their car.
    pub fn update_position(&self, onboard: &BTreeSet<PassengerId>, floor: FloorId) {
        let mut table = self.table();
        for id in onboard {
            if let Some(p) = table.passengers.get_mut(id) {
                if p.status == PassengerStatus::Onboard {
                    p.current = floor;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftgroup_env::TokioContext;

    fn registry() -> PassengerRegistry<TokioContext> {
        PassengerRegistry::new(
            TokioContext::shared(),
            Arc::new(FloorRegistry::uniform(6, 3.0).unwrap()),
            MovementModel::default(),
        )
    }

    #[test]
    fn test_same_floor_trip_rejected() {
        let floors = FloorRegistry::uniform(4, 3.0).unwrap();
        let err = Passenger::new(PassengerId(0), FloorId(2), FloorId(2), Duration::ZERO, &floors)
            .unwrap_err();
        assert_eq!(err, PassengerError::SameFloor(FloorId(2)));

        let err = Passenger::new(PassengerId(0), FloorId(0), FloorId(9), Duration::ZERO, &floors)
            .unwrap_err();
        assert!(matches!(err, PassengerError::Floor(FloorError::Unknown(_))));
    }

    #[test]
    fn test_direction_and_metrics() {
        let floors = FloorRegistry::uniform(6, 3.0).unwrap();
        let mut p = Passenger::new(PassengerId(1), FloorId(4), FloorId(1), Duration::from_secs(10), &floors)
            .unwrap();
        assert_eq!(p.direction, Direction::Down);
        assert_eq!(p.waiting_time(), None);

        p.board_time = Some(Duration::from_secs(25));
        p.arrival_time = Some(Duration::from_secs(40));
        assert_eq!(p.waiting_time(), Some(Duration::from_secs(15)));
        assert_eq!(p.time_on_lift(), Some(Duration::from_secs(15)));
        assert_eq!(p.travel_time(), Some(Duration::from_secs(30)));
        assert!(!p.patience_exceeded(Duration::from_secs(1000)));
    }

    #[test]
    fn test_patience_counts_unboarded_wait() {
        let floors = FloorRegistry::uniform(3, 3.0).unwrap();
        let p = Passenger::new(PassengerId(0), FloorId(0), FloorId(2), Duration::ZERO, &floors).unwrap();
        assert!(!p.patience_exceeded(Duration::from_secs(299)));
        assert!(p.patience_exceeded(Duration::from_secs(301)));
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let registry = registry();
        let a = registry.register_passenger(FloorId(0), FloorId(3), Duration::ZERO).unwrap();
        let b = registry.register_passenger(FloorId(2), FloorId(1), Duration::ZERO).unwrap();
        assert!(b > a);
        assert!(registry
            .register_passenger(FloorId(1), FloorId(1), Duration::ZERO)
            .is_err());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_reserve_respects_capacity_and_order() {
        let registry = registry();
        let ids: Vec<_> = (0..3)
            .map(|i| {
                registry
                    .register_passenger(FloorId(1), FloorId(4), Duration::from_secs(i))
                    .unwrap()
            })
            .collect();

        let reservation = registry.reserve(LiftId(1), FloorId(1), Direction::Up, 2, false);
        assert_eq!(reservation.passengers, vec![ids[0], ids[1]]);
        assert!(registry.passenger(ids[2]).unwrap().candidates.is_empty());
    }

    #[tokio::test]
    async fn test_reserve_without_multi_skips_claimed() {
        let registry = registry();
        let a = registry.register_passenger(FloorId(1), FloorId(4), Duration::ZERO).unwrap();
        let b = registry.register_passenger(FloorId(1), FloorId(5), Duration::ZERO).unwrap();
        assert!(registry.claim(a, LiftId(2)));

        let single = registry.reserve(LiftId(1), FloorId(1), Direction::Up, 5, false);
        assert_eq!(single.passengers, vec![b]);

        let multi = registry.reserve(LiftId(3), FloorId(1), Direction::Up, 5, true);
        assert_eq!(multi.passengers, vec![a, b]);
        let claimed = registry.passenger(a).unwrap().candidates;
        assert_eq!(claimed, BTreeSet::from([LiftId(2), LiftId(3)]));
    }

    #[tokio::test]
    async fn test_release_restores_exact_state() {
        let registry = registry();
        let a = registry.register_passenger(FloorId(2), FloorId(5), Duration::ZERO).unwrap();
        registry.register_passenger(FloorId(2), FloorId(4), Duration::ZERO).unwrap();
        registry.register_passenger(FloorId(2), FloorId(0), Duration::ZERO).unwrap();
        assert!(registry.claim(a, LiftId(7)));
        let before = registry.passengers();

        let reservation = registry.reserve(LiftId(1), FloorId(2), Direction::Up, 4, true);
        assert_ne!(registry.passengers(), before);
        registry.release(LiftId(1), &reservation);

        assert_eq!(registry.passengers(), before);
    }

    #[tokio::test]
    async fn test_board_and_alight() {
        let registry = registry();
        let a = registry.register_passenger(FloorId(0), FloorId(3), Duration::ZERO).unwrap();
        let b = registry.register_passenger(FloorId(0), FloorId(2), Duration::ZERO).unwrap();
        // Held by another lift, so not ours to board
        assert!(registry.claim(b, LiftId(9)));

        let boarded = registry.board_at(LiftId(1), FloorId(0), Direction::Up, 5);
        assert_eq!(boarded, vec![a]);
        let p = registry.passenger(a).unwrap();
        assert_eq!(p.status, PassengerStatus::Onboard);
        assert_eq!(p.lift, Some(LiftId(1)));
        assert!(p.candidates.is_empty());

        let onboard = BTreeSet::from([a]);
        assert!(registry.alight(LiftId(1), FloorId(2), &onboard).is_empty());
        assert_eq!(registry.alight(LiftId(1), FloorId(3), &onboard), vec![a]);
        assert_eq!(registry.passenger(a).unwrap().status, PassengerStatus::Arrived);
    }

    #[tokio::test]
    async fn test_boarded_passenger_cannot_be_boarded_twice() {
        let registry = registry();
        let a = registry.register_passenger(FloorId(1), FloorId(3), Duration::ZERO).unwrap();
        assert!(registry.board_passenger(a, LiftId(1), FloorId(1), Direction::Up));
        assert!(!registry.board_passenger(a, LiftId(2), FloorId(1), Direction::Up));
        assert_eq!(registry.passenger(a).unwrap().lift, Some(LiftId(1)));
        assert!(!registry.claim(a, LiftId(2)));
    }

    #[tokio::test]
    async fn test_requests_for_lift() {
        let registry = registry();
        let a = registry.register_passenger(FloorId(1), FloorId(3), Duration::ZERO).unwrap();
        let b = registry.register_passenger(FloorId(4), FloorId(2), Duration::ZERO).unwrap();
        registry.claim(b, LiftId(2));

        let requests = registry
            .requests_for(LiftId(1), &BTreeSet::new(), true)
            .unwrap();
        let floors: Vec<_> = requests.iter().map(|r| r.floor).collect();
        assert_eq!(floors, vec![FloorId(1)]);

        registry.board_at(LiftId(1), FloorId(1), Direction::Up, 1);
        let requests = registry
            .requests_for(LiftId(1), &BTreeSet::from([a]), false)
            .unwrap();
        let first = requests.iter().next().unwrap();
        assert_eq!(first.floor, FloorId(3));
        assert_eq!(first.kind, RequestKind::DropOff);
    }

    #[tokio::test]
    async fn test_drop_claims_frees_passengers() {
        let registry = registry();
        let a = registry.register_passenger(FloorId(3), FloorId(0), Duration::ZERO).unwrap();
        registry.claim(a, LiftId(1));
        assert!(registry.unclaimed_by_floor().is_empty());

        assert_eq!(registry.drop_claims_at(LiftId(1), FloorId(3)), vec![a]);
        assert_eq!(registry.unclaimed_by_floor().get(&FloorId(3)), Some(&vec![a]));
    }
}
