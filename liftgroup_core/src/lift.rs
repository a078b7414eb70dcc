//! Lift Runtime - one actor per car.
//!
//! Each lift owns its position, direction, riders and reservation, and is
//! the only task that ever changes them. Other tasks see a lift through
//! the [`LiftStatus`] it publishes and talk to it through its inbox.
//!
//! # Loop
//!
//! ```text
//!        ┌────────────── choose_target ◄──────────────┐
//!        │ none                  │ some               │
//!        ▼                       ▼                    │
//!   park (Stationary)    decide direction, reserve    │
//!   wait for inbox               │                    │
//!        │               move (offers may redirect)   │
//!        │                       │                    │
//!        └──────────────►  load (off, then on) ───────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let lift = Lift::new(LiftConfig::new(LiftId(1)), Arc::clone(&registry))?;
//! ctx.spawn("L1", async move { let _ = lift.run().await; });
//! ```

use liftgroup_env::{mailbox, EnvError, FloorId, LiftContext, LiftId, Mailbox, PassengerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::boarding::BoardingModel;
use crate::dispatch::{DeclineReason, LiftHandle, LiftMessage, Offer, OfferReply, ReassignRequest};
use crate::events::EventKind;
use crate::floors::{FloorError, FloorRegistry};
use crate::motion::{to_duration, Direction, KinematicState, MovementModel, Trajectory};
use crate::passengers::{Claim, PassengerRegistry, Reservation};
use crate::scan::{self, Position, RequestSet};

pub const DEFAULT_CAPACITY: usize = 12;

#[derive(Debug, Error)]
pub enum LiftError {
    #[error("Lift {0} must carry at least one passenger")]
    ZeroCapacity(LiftId),

    #[error(transparent)]
    Floor(#[from] FloorError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Lift {0} inbox closed")]
    Shutdown(LiftId),
}

/// Static description of one car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiftConfig {
    pub id: LiftId,
    /// Maximum riders (at least 1)
    pub capacity: usize,
    pub home_floor: FloorId,
    pub home_direction: Direction,
}

impl LiftConfig {
    pub fn new(id: LiftId) -> Self {
        Self {
            id,
            capacity: DEFAULT_CAPACITY,
            home_floor: FloorId(0),
            home_direction: Direction::Up,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_home(mut self, floor: FloorId, direction: Direction) -> Self {
        self.home_floor = floor;
        self.home_direction = direction;
        self
    }
}

// ============================================================================
// PUBLISHED STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LiftPhase {
    /// Parked, waiting for work
    Idle,
    Moving,
    Offboarding,
    Onboarding,
}

/// A trip in progress.
///
/// After a redirect, `trajectory.origin()` is the state snapshot taken at
/// the redirect and `started_at` the moment it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Motion {
    pub target: FloorId,
    pub trajectory: Trajectory,
    pub started_at: Duration,
    pub redirects: u32,
}

impl Motion {
    pub fn state_at(&self, now: Duration) -> KinematicState {
        self.trajectory
            .state_at(now.saturating_sub(self.started_at).as_secs_f64())
    }

    pub fn deadline(&self) -> Duration {
        self.started_at + to_duration(self.trajectory.duration())
    }
}

/// Snapshot a lift publishes after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct LiftStatus {
    pub id: LiftId,
    pub capacity: usize,
    pub floor: FloorId,
    pub height: f64,
    pub direction: Direction,
    pub next_direction: Direction,
    pub target: Option<FloorId>,
    pub onboard: usize,
    /// Passengers reserved at the current target, not yet on board
    pub reserved: usize,
    pub phase: LiftPhase,
    pub motion: Option<Motion>,
}

impl LiftStatus {
    /// An empty car parked at `floor`.
    pub fn parked(id: LiftId, capacity: usize, floor: FloorId, height: f64) -> Self {
        Self {
            id,
            capacity,
            floor,
            height,
            direction: Direction::Stationary,
            next_direction: Direction::Stationary,
            target: None,
            onboard: 0,
            reserved: 0,
            phase: LiftPhase::Idle,
            motion: None,
        }
    }

    pub fn is_stationary(&self) -> bool {
        self.phase == LiftPhase::Idle || self.direction == Direction::Stationary
    }

    pub fn spare_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.onboard + self.reserved)
    }
}

// ============================================================================
// LIFT ACTOR
// ============================================================================

pub struct Lift<Ctx: LiftContext> {
    config: LiftConfig,
    context: Arc<Ctx>,
    registry: Arc<PassengerRegistry<Ctx>>,
    floors: Arc<FloorRegistry>,
    model: MovementModel,
    boarding: BoardingModel,
    inbox: Mailbox<LiftMessage>,
    status_tx: watch::Sender<LiftStatus>,

    floor: FloorId,
    height: f64,
    direction: Direction,
    next_direction: Direction,
    target: Option<FloorId>,
    onboard: BTreeSet<PassengerId>,
    reservation: Option<Reservation>,
    motion: Option<Motion>,
    /// End of the current boarding window
    loading: Option<Duration>,
    /// The single timer the lift is waiting on
    deadline: Option<Duration>,
    phase: LiftPhase,
}

impl<Ctx: LiftContext> Lift<Ctx> {
    /// Creates a lift at its home floor and registers it for dispatch.
    pub fn new(config: LiftConfig, registry: Arc<PassengerRegistry<Ctx>>) -> Result<Self, LiftError> {
        if config.capacity == 0 {
            return Err(LiftError::ZeroCapacity(config.id));
        }
        let floors = Arc::clone(registry.floors());
        let height = floors.height(config.home_floor)?;

        let (inbox_tx, inbox) = mailbox(config.id.to_string());
        let initial = LiftStatus {
            direction: config.home_direction,
            next_direction: config.home_direction,
            ..LiftStatus::parked(config.id, config.capacity, config.home_floor, height)
        };
        let (status_tx, status_rx) = watch::channel(initial);
        registry.register_lift(LiftHandle::new(config.id, config.capacity, inbox_tx, status_rx));

        Ok(Self {
            context: Arc::clone(registry.context()),
            model: registry.model(),
            boarding: BoardingModel::default(),
            floors,
            registry,
            inbox,
            status_tx,
            floor: config.home_floor,
            height,
            direction: config.home_direction,
            next_direction: config.home_direction,
            target: None,
            onboard: BTreeSet::new(),
            reservation: None,
            motion: None,
            loading: None,
            deadline: None,
            phase: LiftPhase::Idle,
            config,
        })
    }

    pub fn with_boarding(mut self, boarding: BoardingModel) -> Self {
        self.boarding = boarding;
        self
    }

    pub fn id(&self) -> LiftId {
        self.config.id
    }

    pub fn status(&self) -> LiftStatus {
        LiftStatus {
            id: self.config.id,
            capacity: self.config.capacity,
            floor: self.floor,
            height: self.height,
            direction: self.direction,
            next_direction: self.next_direction,
            target: self.target,
            onboard: self.onboard.len(),
            reserved: self.reserved(),
            phase: self.phase,
            motion: self.motion.clone(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    fn reserved(&self) -> usize {
        self.reservation.as_ref().map_or(0, |r| r.passengers.len())
    }

    /// Seats left once everyone reserved has boarded.
    fn spare_capacity(&self) -> usize {
        self.config
            .capacity
            .saturating_sub(self.onboard.len() + self.reserved())
    }

    fn position(&self) -> Position {
        Position {
            floor: self.floor,
            height: self.height,
            direction: self.direction,
        }
    }

    fn outstanding_requests(&self) -> Result<RequestSet, LiftError> {
        let has_room = self.onboard.len() < self.config.capacity;
        Ok(self
            .registry
            .requests_for(self.config.id, &self.onboard, has_room)?)
    }

    // ========== Main loop ==========

    /// Runs the lift until its inbox closes.
    pub async fn run(mut self) -> Result<(), LiftError> {
        info!(lift = %self.config.id, floor = %self.floor, capacity = self.config.capacity, "lift started");
        match self.run_loop().await {
            Err(LiftError::Shutdown(id)) => {
                info!(lift = %id, "lift stopped");
                Ok(())
            }
            other => other,
        }
    }

    async fn run_loop(&mut self) -> Result<(), LiftError> {
        loop {
            let requests = self.outstanding_requests()?;
            let Some(target) = scan::choose_target(&self.position(), &requests) else {
                self.park(true).await?;
                continue;
            };

            self.next_direction = scan::decide_next_direction(&self.position(), target, &requests);
            self.reserve(target, false);
            let moved = self.move_to(target).await?;
            let transferred = self.load().await?;

            if !moved && transferred == 0 {
                warn!(lift = %self.config.id, floor = %self.floor, "no progress at target, parking");
                self.park(false).await?;
            }
        }
    }

    /// Becomes Stationary and blocks until a message arrives.
    async fn park(&mut self, notify: bool) -> Result<(), LiftError> {
        self.release();
        self.direction = Direction::Stationary;
        self.next_direction = Direction::Stationary;
        self.target = None;
        self.phase = LiftPhase::Idle;
        self.publish();
        self.registry.emit(EventKind::LiftIdle {
            lift: self.config.id,
            floor: self.floor,
        });
        if notify {
            self.registry
                .request_reassignment(ReassignRequest::LiftIdle(self.config.id));
        }

        let message = self
            .inbox
            .recv()
            .await
            .ok_or(LiftError::Shutdown(self.config.id))?;
        self.handle_message(message);
        Ok(())
    }

    // ========== Reservations ==========

    /// Claims waiting passengers at `target` heading the decided direction.
    pub fn reserve(&mut self, target: FloorId, allow_multi: bool) {
        self.release();
        let spare = self.config.capacity.saturating_sub(self.onboard.len());
        let reservation = self.registry.reserve(
            self.config.id,
            target,
            self.next_direction,
            spare,
            allow_multi,
        );
        debug!(lift = %self.config.id, %target, reserved = reservation.passengers.len(), "reserved");
        self.reservation = Some(reservation);
    }

    /// Undoes the current reservation and hands freed passengers back.
    pub fn release(&mut self) -> Vec<PassengerId> {
        let Some(reservation) = self.reservation.take() else {
            return Vec::new();
        };
        let freed = self.registry.release(self.config.id, &reservation);
        if !freed.is_empty() {
            self.registry.emit(EventKind::ClaimsReleased {
                lift: self.config.id,
                floor: reservation.floor,
                passengers: freed.clone(),
            });
            self.registry.request_reassignment(ReassignRequest::Released {
                floor: reservation.floor,
                passengers: freed.clone(),
            });
        }
        freed
    }

    // ========== Movement ==========

    /// Travels to `target`, handling offers on the way.
    ///
    /// Returns false when the car was already there.
    async fn move_to(&mut self, target: FloorId) -> Result<bool, LiftError> {
        if target == self.floor {
            self.arrive(target)?;
            return Ok(false);
        }

        let target_height = self.floors.height(target)?;
        let now = self.context.now();
        let trajectory = self
            .model
            .plan(KinematicState::at_rest(self.height), target_height);
        let eta = trajectory.duration();

        self.direction = Direction::between(self.height, target_height);
        self.target = Some(target);
        self.phase = LiftPhase::Moving;
        let motion = Motion {
            target,
            trajectory,
            started_at: now,
            redirects: 0,
        };
        self.deadline = Some(motion.deadline());
        self.motion = Some(motion);
        self.publish();
        self.registry.emit(EventKind::Departed {
            lift: self.config.id,
            from: self.floor,
            to: target,
            eta_secs: eta,
        });

        self.wait_for_deadline().await?;

        let destination = self.motion.as_ref().map_or(target, |m| m.target);
        self.arrive(destination)?;
        Ok(true)
    }

    /// Sleeps until the current deadline, serving the inbox meanwhile.
    ///
    /// Offers may move the deadline; every wake-up re-arms the timer with
    /// whatever time is left.
    async fn wait_for_deadline(&mut self) -> Result<(), LiftError> {
        let context = Arc::clone(&self.context);
        loop {
            let Some(deadline) = self.deadline else {
                return Ok(());
            };
            let now = context.now();
            if now >= deadline {
                self.deadline = None;
                return Ok(());
            }

            let woke = tokio::select! {
                biased;
                _ = context.sleep(deadline - now) => None,
                message = self.inbox.recv() => Some(message),
            };
            if let Some(message) = woke {
                let message = message.ok_or(LiftError::Shutdown(self.config.id))?;
                self.handle_message(message);
            }
        }
    }

    fn arrive(&mut self, floor: FloorId) -> Result<(), LiftError> {
        self.height = self.floors.height(floor)?;
        self.floor = floor;
        self.motion = None;
        self.deadline = None;
        self.registry.update_position(&self.onboard, floor);

        self.direction = if floor == self.floors.lowest() && floor != self.floors.highest() {
            Direction::Up
        } else if floor == self.floors.highest() && floor != self.floors.lowest() {
            Direction::Down
        } else {
            let requests = self.outstanding_requests()?;
            scan::decide_next_direction(&self.position(), floor, &requests)
        };
        self.next_direction = self.direction;
        self.publish();

        debug!(lift = %self.config.id, %floor, direction = %self.direction, "arrived");
        self.registry.emit(EventKind::LiftArrived {
            lift: self.config.id,
            floor,
            direction: self.direction,
        });
        Ok(())
    }

    // ========== Loading ==========

    /// Lets riders off, then takes waiting passengers on.
    ///
    /// Returns how many passengers went through the doors.
    async fn load(&mut self) -> Result<usize, LiftError> {
        let capacity = self.config.capacity;

        self.phase = LiftPhase::Offboarding;
        let before = self.onboard.len();
        let alighted = self.registry.alight(self.config.id, self.floor, &self.onboard);
        for id in &alighted {
            self.onboard.remove(id);
        }
        self.publish();
        self.deadline =
            Some(self.context.now() + self.boarding.duration(capacity, before, self.onboard.len()));
        self.wait_for_deadline().await?;

        self.phase = LiftPhase::Onboarding;
        let seated = self.onboard.len();
        let boarded = self.registry.board_at(
            self.config.id,
            self.floor,
            self.direction,
            capacity.saturating_sub(seated),
        );
        self.onboard.extend(boarded.iter().copied());
        // Whoever was reserved here either boarded or is released below
        self.reservation = None;
        let window = self.context.now() + self.boarding.duration(capacity, seated, self.onboard.len());
        self.loading = Some(window);
        self.deadline = Some(window);
        self.publish();
        self.wait_for_deadline().await?;
        self.loading = None;

        let freed = self.registry.drop_claims_at(self.config.id, self.floor);
        if !freed.is_empty() {
            self.registry.emit(EventKind::ClaimsReleased {
                lift: self.config.id,
                floor: self.floor,
                passengers: freed.clone(),
            });
            self.registry.request_reassignment(ReassignRequest::Released {
                floor: self.floor,
                passengers: freed,
            });
        }

        self.target = None;
        self.publish();

        let on = self.onboard.len() - seated;
        debug!(lift = %self.config.id, floor = %self.floor, off = alighted.len(), on, "loaded");
        Ok(alighted.len() + on)
    }

    // ========== Offers ==========

    fn handle_message(&mut self, message: LiftMessage) {
        match message {
            LiftMessage::Offer(offer) => {
                let reply = match self.phase {
                    LiftPhase::Idle => self.consider_pickup(&offer),
                    LiftPhase::Moving => self.consider_redirect(&offer),
                    LiftPhase::Onboarding => self.consider_boarding(&offer),
                    LiftPhase::Offboarding => OfferReply::Declined(DeclineReason::Busy),
                };
                debug!(lift = %self.config.id, passenger = %offer.passenger, ?reply, phase = ?self.phase, "offer handled");
                offer.respond(reply);
            }
        }
    }

    fn consider_pickup(&mut self, offer: &Offer) -> OfferReply {
        if self.onboard.len() >= self.config.capacity {
            return OfferReply::Declined(DeclineReason::NoCapacity);
        }
        if self.registry.claim(offer.passenger, self.config.id) {
            OfferReply::Accepted
        } else {
            OfferReply::Declined(DeclineReason::NotWaiting)
        }
    }

    fn consider_redirect(&mut self, offer: &Offer) -> OfferReply {
        let (Some(target), Some(motion)) = (self.target, self.motion.as_ref()) else {
            return OfferReply::Declined(DeclineReason::Busy);
        };
        if self.spare_capacity() == 0 {
            return OfferReply::Declined(DeclineReason::NoCapacity);
        }

        // Already stopping there: just add the passenger
        if offer.floor == target {
            if offer.direction != self.next_direction {
                return OfferReply::Declined(DeclineReason::WrongDirection);
            }
            let before = self.registry.passenger(offer.passenger);
            if !self.registry.claim(offer.passenger, self.config.id) {
                return OfferReply::Declined(DeclineReason::NotWaiting);
            }
            if let Some(reservation) = self.reservation.as_mut() {
                if !reservation.passengers.contains(&offer.passenger) {
                    reservation.passengers.push(offer.passenger);
                }
                let held = before
                    .as_ref()
                    .is_some_and(|p| p.candidates.contains(&self.config.id));
                if !held {
                    reservation.claims.push(Claim {
                        passenger: offer.passenger,
                        stamped: before.as_ref().is_some_and(|p| p.assigned_at.is_none()),
                    });
                }
            }
            self.publish();
            return OfferReply::Accepted;
        }

        if offer.direction != self.direction {
            return OfferReply::Declined(DeclineReason::WrongDirection);
        }
        let Ok(floor_height) = self.floors.height(offer.floor) else {
            return OfferReply::Declined(DeclineReason::NotOnRoute);
        };

        let now = self.context.now();
        let state = motion.state_at(now);
        let target_height = motion.trajectory.target_height();
        let on_route = match self.direction {
            Direction::Up => state.height < floor_height && floor_height < target_height,
            Direction::Down => state.height > floor_height && floor_height > target_height,
            Direction::Stationary => false,
        };
        if !on_route {
            return OfferReply::Declined(DeclineReason::NotOnRoute);
        }
        if !self.model.can_stop_at(&state, floor_height) {
            return OfferReply::Declined(DeclineReason::CannotStop);
        }

        let redirects = motion.redirects + 1;
        self.redirect(offer.floor, floor_height, state, now, redirects);
        OfferReply::Accepted
    }

    /// Swaps the current target for `floor`, planning from the live state.
    fn redirect(
        &mut self,
        floor: FloorId,
        floor_height: f64,
        state: KinematicState,
        now: Duration,
        redirects: u32,
    ) {
        let from = self.target.unwrap_or(floor);
        self.release();

        let trajectory = self.model.plan(state, floor_height);
        let remaining = trajectory.duration();
        let motion = Motion {
            target: floor,
            trajectory,
            started_at: now,
            redirects,
        };
        self.deadline = Some(motion.deadline());
        self.motion = Some(motion);
        self.target = Some(floor);
        self.next_direction = self.direction;
        self.reserve(floor, true);
        self.publish();

        info!(lift = %self.config.id, %from, to = %floor, remaining, "redirected");
        self.registry.emit(EventKind::Redirected {
            lift: self.config.id,
            from,
            to: floor,
            remaining_secs: remaining,
        });
    }

    fn consider_boarding(&mut self, offer: &Offer) -> OfferReply {
        let Some(window) = self.loading else {
            return OfferReply::Declined(DeclineReason::Busy);
        };
        if offer.floor != self.floor {
            return OfferReply::Declined(DeclineReason::NotOnRoute);
        }
        if offer.direction != self.direction {
            return OfferReply::Declined(DeclineReason::WrongDirection);
        }
        if self.onboard.len() >= self.config.capacity {
            return OfferReply::Declined(DeclineReason::NoCapacity);
        }
        if self.context.now() >= window {
            return OfferReply::Declined(DeclineReason::Busy);
        }

        if self
            .registry
            .board_passenger(offer.passenger, self.config.id, self.floor, self.direction)
        {
            self.onboard.insert(offer.passenger);
            self.publish();
            OfferReply::Accepted
        } else {
            OfferReply::Declined(DeclineReason::NotWaiting)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LiftEvent;
    use crate::passengers::PassengerStatus;
    use liftgroup_env::TokioContext;
    use tokio::sync::broadcast;

    type Registry = PassengerRegistry<TokioContext>;

    async fn building(floors: usize, lifts: Vec<LiftConfig>) -> Arc<Registry> {
        let registry = Arc::new(PassengerRegistry::new(
            TokioContext::shared(),
            Arc::new(FloorRegistry::uniform(floors, 3.0).unwrap()),
            MovementModel::new(1.0, 2.0).unwrap(),
        ));
        tokio::spawn(Arc::clone(&registry).reassignment_listener());
        for config in lifts {
            let lift = Lift::new(config, Arc::clone(&registry)).unwrap();
            tokio::spawn(async move {
                let _ = lift.run().await;
            });
        }
        // Let every lift reach its first park
        tokio::time::sleep(Duration::from_millis(1)).await;
        registry
    }

    fn drain(rx: &mut broadcast::Receiver<LiftEvent>) -> Vec<EventKind> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.kind);
        }
        events
    }

    fn arrivals(events: &[EventKind], lift: LiftId) -> Vec<(FloorId, Direction)> {
        events
            .iter()
            .filter_map(|e| match e {
                EventKind::LiftArrived {
                    lift: l,
                    floor,
                    direction,
                } if *l == lift => Some((*floor, *direction)),
                _ => None,
            })
            .collect()
    }

    async fn arrive(registry: &Registry, source: usize, target: usize) -> PassengerId {
        registry
            .passenger_arrival(FloorId(source), FloorId(target), registry.now())
            .await
            .unwrap()
    }

    #[test]
    fn test_lift_config_builder() {
        let config = LiftConfig::new(LiftId(3))
            .with_capacity(8)
            .with_home(FloorId(4), Direction::Down);
        assert_eq!(config.capacity, 8);
        assert_eq!(config.home_floor, FloorId(4));
        assert_eq!(config.home_direction, Direction::Down);
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let registry = Arc::new(PassengerRegistry::new(
            TokioContext::shared(),
            Arc::new(FloorRegistry::uniform(3, 3.0).unwrap()),
            MovementModel::default(),
        ));
        let err = Lift::new(LiftConfig::new(LiftId(1)).with_capacity(0), Arc::clone(&registry));
        assert!(matches!(err, Err(LiftError::ZeroCapacity(_))));
        let err = Lift::new(
            LiftConfig::new(LiftId(1)).with_home(FloorId(7), Direction::Up),
            registry,
        );
        assert!(matches!(err, Err(LiftError::Floor(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trip() {
        let registry = building(6, vec![LiftConfig::new(LiftId(1))]).await;
        let mut events = registry.subscribe();

        let p = arrive(&registry, 0, 5).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        let passenger = registry.passenger(p).unwrap();
        assert_eq!(passenger.status, PassengerStatus::Arrived);
        assert_eq!(passenger.lift, Some(LiftId(1)));
        let board = passenger.board_time.unwrap();
        let arrival = passenger.arrival_time.unwrap();
        assert!(passenger.trip_start <= board && board <= arrival);
        // 15m at a=1, v=2 takes 9.5s after a 0.5s boarding window
        let ride = (arrival - board).as_secs_f64();
        assert!((ride - 10.0).abs() < 0.01, "ride took {ride}s");

        let kinds = drain(&mut events);
        let boarded = kinds
            .iter()
            .position(|e| matches!(e, EventKind::Boarded { .. }))
            .unwrap();
        let alighted = kinds
            .iter()
            .position(|e| matches!(e, EventKind::Alighted { .. }))
            .unwrap();
        assert!(boarded < alighted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_to_floor_on_route() {
        let registry = building(6, vec![LiftConfig::new(LiftId(1))]).await;
        let mut events = registry.subscribe();

        let first = arrive(&registry, 0, 5).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = arrive(&registry, 3, 4).await;

        let status = registry.lift_handles()[0].status();
        assert_eq!(status.target, Some(FloorId(3)));
        assert_eq!(status.motion.as_ref().map(|m| m.redirects), Some(1));

        tokio::time::sleep(Duration::from_secs(60)).await;
        let kinds = drain(&mut events);

        assert!(kinds.iter().any(|e| matches!(
            e,
            EventKind::Redirected { from, to, .. } if *from == FloorId(5) && *to == FloorId(3)
        )));
        let floors: Vec<FloorId> = arrivals(&kinds, LiftId(1)).into_iter().map(|a| a.0).collect();
        assert_eq!(floors, vec![FloorId(0), FloorId(3), FloorId(4), FloorId(5)]);

        for id in [first, second] {
            let p = registry.passenger(id).unwrap();
            assert_eq!(p.status, PassengerStatus::Arrived);
            assert_eq!(p.lift, Some(LiftId(1)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrivals_spread_over_two_lifts() {
        let registry = building(6, vec![LiftConfig::new(LiftId(1)), LiftConfig::new(LiftId(2))]).await;

        let a = arrive(&registry, 1, 2).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        let b = arrive(&registry, 2, 3).await;
        let c = arrive(&registry, 1, 3).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        let lifts: Vec<Option<LiftId>> = [a, b, c]
            .iter()
            .map(|id| registry.passenger(*id).unwrap().lift)
            .collect();
        assert_eq!(lifts, vec![Some(LiftId(1)), Some(LiftId(2)), Some(LiftId(1))]);
        for id in [a, b, c] {
            let p = registry.passenger(id).unwrap();
            assert_eq!(p.status, PassengerStatus::Arrived);
            assert!(p.candidates.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_request_sets_direction_near_boundary() {
        let home = LiftConfig::new(LiftId(1)).with_home(FloorId(4), Direction::Down);
        let registry = building(5, vec![home]).await;
        let mut events = registry.subscribe();

        let p = arrive(&registry, 3, 4).await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        let kinds = drain(&mut events);
        let stops = arrivals(&kinds, LiftId(1));
        assert_eq!(stops[0], (FloorId(3), Direction::Up));
        assert_eq!(stops[1], (FloorId(4), Direction::Down));
        assert_eq!(registry.passenger(p).unwrap().status, PassengerStatus::Arrived);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_limits_boarding() {
        let registry = building(4, vec![LiftConfig::new(LiftId(1)).with_capacity(2)]).await;

        let a = arrive(&registry, 0, 1).await;
        let b = arrive(&registry, 0, 1).await;
        let c = arrive(&registry, 0, 1).await;

        let status = registry.lift_handles()[0].status();
        assert_eq!(status.onboard, 2);
        assert_eq!(registry.passenger(c).unwrap().status, PassengerStatus::Waiting);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let pa = registry.passenger(a).unwrap();
        let pb = registry.passenger(b).unwrap();
        let pc = registry.passenger(c).unwrap();
        assert_eq!(pa.board_time, pb.board_time);
        assert!(pc.board_time.unwrap() >= pa.arrival_time.unwrap());
        assert_eq!(pc.status, PassengerStatus::Arrived);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parks_stationary_then_serves_down_call() {
        let registry = building(6, vec![LiftConfig::new(LiftId(1))]).await;
        let mut events = registry.subscribe();

        arrive(&registry, 0, 3).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        let status = registry.lift_handles()[0].status();
        assert_eq!(status.direction, Direction::Stationary);
        assert_eq!(status.floor, FloorId(3));

        let p = arrive(&registry, 2, 0).await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        let kinds = drain(&mut events);
        assert!(arrivals(&kinds, LiftId(1)).contains(&(FloorId(2), Direction::Down)));
        assert_eq!(registry.passenger(p).unwrap().status, PassengerStatus::Arrived);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opposite_call_served_after_turnaround() {
        let registry = building(6, vec![LiftConfig::new(LiftId(1))]).await;

        let up = arrive(&registry, 0, 5).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        // Car is above floor 2 going up; the down call waits for the turn
        let down = arrive(&registry, 2, 0).await;
        assert!(registry.passenger(down).unwrap().candidates.is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        let pu = registry.passenger(up).unwrap();
        let pd = registry.passenger(down).unwrap();
        assert_eq!(pd.status, PassengerStatus::Arrived);
        assert_eq!(pd.lift, Some(LiftId(1)));
        assert!(pd.board_time.unwrap() >= pu.arrival_time.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_declines_unreachable_floors() {
        let registry = building(6, vec![LiftConfig::new(LiftId(1))]).await;
        let mut events = registry.subscribe();

        arrive(&registry, 0, 5).await;
        // 3.5s into the trip: at 5m doing 2m/s, so the car needs until 7m to stop
        tokio::time::sleep(Duration::from_secs(4)).await;
        let lift = registry.lift_handles()[0].clone();
        let status = lift.status();
        assert_eq!(status.phase, LiftPhase::Moving);

        let passed = registry
            .register_passenger(FloorId(1), FloorId(5), registry.now())
            .unwrap();
        let reply = lift.offer(passed, FloorId(1), Direction::Up).await.unwrap();
        assert_eq!(reply, OfferReply::Declined(DeclineReason::NotOnRoute));

        let too_close = registry
            .register_passenger(FloorId(2), FloorId(5), registry.now())
            .unwrap();
        let reply = lift.offer(too_close, FloorId(2), Direction::Up).await.unwrap();
        assert_eq!(reply, OfferReply::Declined(DeclineReason::CannotStop));

        let status = lift.status();
        assert_eq!(status.target, Some(FloorId(5)));
        assert_eq!(status.motion.as_ref().map(|m| m.redirects), Some(0));

        tokio::time::sleep(Duration::from_secs(60)).await;
        let kinds = drain(&mut events);
        assert!(!kinds.iter().any(|e| matches!(e, EventKind::Redirected { .. })));
        let floors: Vec<FloorId> = arrivals(&kinds, LiftId(1)).into_iter().map(|a| a.0).collect();
        assert_eq!(&floors[..2], &[FloorId(0), FloorId(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_car_declines_redirect() {
        let registry = building(6, vec![LiftConfig::new(LiftId(1)).with_capacity(1)]).await;

        arrive(&registry, 0, 5).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let lift = registry.lift_handles()[0].clone();
        assert_eq!(lift.status().onboard, 1);

        let p = registry
            .register_passenger(FloorId(3), FloorId(4), registry.now())
            .unwrap();
        let reply = lift.offer(p, FloorId(3), Direction::Up).await.unwrap();
        assert_eq!(reply, OfferReply::Declined(DeclineReason::NoCapacity));
        assert_eq!(lift.status().target, Some(FloorId(5)));
        assert!(registry.passenger(p).unwrap().candidates.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chained_redirects() {
        let registry = building(6, vec![LiftConfig::new(LiftId(1))]).await;
        let mut events = registry.subscribe();

        let first = arrive(&registry, 0, 5).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let second = arrive(&registry, 4, 5).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        let third = arrive(&registry, 2, 5).await;

        let status = registry.lift_handles()[0].status();
        assert_eq!(status.target, Some(FloorId(2)));
        assert_eq!(status.motion.as_ref().map(|m| m.redirects), Some(2));

        tokio::time::sleep(Duration::from_secs(60)).await;
        let kinds = drain(&mut events);
        let redirects: Vec<(FloorId, FloorId)> = kinds
            .iter()
            .filter_map(|e| match e {
                EventKind::Redirected { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        assert_eq!(redirects, vec![(FloorId(5), FloorId(4)), (FloorId(4), FloorId(2))]);

        let floors: Vec<FloorId> = arrivals(&kinds, LiftId(1)).into_iter().map(|a| a.0).collect();
        assert_eq!(floors, vec![FloorId(0), FloorId(2), FloorId(4), FloorId(5)]);
        for id in [first, second, third] {
            let p = registry.passenger(id).unwrap();
            assert_eq!(p.status, PassengerStatus::Arrived);
            assert_eq!(p.lift, Some(LiftId(1)));
        }
    }
}
