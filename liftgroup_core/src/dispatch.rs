//! Coordination protocol between the passenger registry and the lifts.
//!
//! The registry never touches a lift's state. It ranks lifts by how soon
//! they could reach a passenger, then offers the passenger to one lift
//! inbox at a time and waits for the answer. A single dispatch lock makes
//! sure only one such search is in flight across the building.
//!
//! ```text
//! arrival ──► rank lifts ──► [dispatch lock] ──► offer L2 ──► declined
//!                                             └─► offer L1 ──► accepted
//! ```

use liftgroup_env::{EnvError, FloorId, LiftContext, LiftId, MailboxSender, PassengerId};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::events::EventKind;
use crate::lift::LiftStatus;
use crate::motion::Direction;
use crate::passengers::{PassengerError, PassengerRegistry, PassengerStatus};

/// Longest a dispatcher waits for one lift to answer an offer.
pub const OFFER_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// MESSAGES
// ============================================================================

/// Messages delivered to a lift inbox.
#[derive(Debug)]
pub enum LiftMessage {
    Offer(Offer),
}

/// "Can you take this passenger?"
#[derive(Debug)]
pub struct Offer {
    pub passenger: PassengerId,
    pub floor: FloorId,
    pub direction: Direction,
    reply: oneshot::Sender<OfferReply>,
}

impl Offer {
    pub fn new(
        passenger: PassengerId,
        floor: FloorId,
        direction: Direction,
    ) -> (Self, oneshot::Receiver<OfferReply>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                passenger,
                floor,
                direction,
                reply,
            },
            rx,
        )
    }

    /// Sends the answer back to the dispatcher.
    pub fn respond(self, reply: OfferReply) {
        // The dispatcher may have been torn down at shutdown
        let _ = self.reply.send(reply);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferReply {
    Accepted,
    Declined(DeclineReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    NoCapacity,
    WrongDirection,
    /// Floor is not between the car and its target
    NotOnRoute,
    /// Too close to brake for
    CannotStop,
    /// Mid-phase where offers are not taken
    Busy,
    /// Someone else already picked the passenger up
    NotWaiting,
}

/// Work for the reassignment listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ReassignRequest {
    /// A lift dropped its claims on these passengers
    Released {
        floor: FloorId,
        passengers: Vec<PassengerId>,
    },
    /// A lift ran out of work
    LiftIdle(LiftId),
}

// ============================================================================
// LIFT HANDLE
// ============================================================================

/// What the registry keeps of each lift: its inbox and a live status view.
#[derive(Debug, Clone)]
pub struct LiftHandle {
    pub id: LiftId,
    pub capacity: usize,
    inbox: MailboxSender<LiftMessage>,
    status: watch::Receiver<LiftStatus>,
}

impl LiftHandle {
    pub fn new(
        id: LiftId,
        capacity: usize,
        inbox: MailboxSender<LiftMessage>,
        status: watch::Receiver<LiftStatus>,
    ) -> Self {
        Self {
            id,
            capacity,
            inbox,
            status,
        }
    }

    /// Latest status the lift published.
    pub fn status(&self) -> LiftStatus {
        self.status.borrow().clone()
    }

    /// Sends an offer and waits up to [`OFFER_TIMEOUT`] for the answer.
    pub async fn offer(
        &self,
        passenger: PassengerId,
        floor: FloorId,
        direction: Direction,
    ) -> Result<OfferReply, EnvError> {
        let (offer, reply) = Offer::new(passenger, floor, direction);
        self.inbox.send(LiftMessage::Offer(offer))?;
        match tokio::time::timeout(OFFER_TIMEOUT, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(EnvError::reply_dropped(self.id)),
            Err(_) => Err(EnvError::Timeout(OFFER_TIMEOUT.as_millis() as u64)),
        }
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

impl<Ctx: LiftContext> PassengerRegistry<Ctx> {
    pub fn register_lift(&self, handle: LiftHandle) {
        info!(lift = %handle.id, capacity = handle.capacity, "lift registered");
        self.lifts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    pub fn lift_handles(&self) -> Vec<LiftHandle> {
        self.lifts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drops every inbox sender so lifts leave their loops.
    pub fn shutdown(&self) {
        let mut lifts = self.lifts.write().unwrap_or_else(PoisonError::into_inner);
        info!(lifts = lifts.len(), "registry shutting down");
        lifts.clear();
    }

    /// Seconds until `status` could be at rest at `floor`.
    pub fn estimate_time_to(&self, status: &LiftStatus, floor: FloorId) -> Option<f64> {
        let height = self.floors().height(floor).ok()?;
        let model = self.model();
        Some(match &status.motion {
            Some(motion) => model.time_to(&motion.state_at(self.now()), height),
            None => model.travel_time(height - status.height),
        })
    }

    /// Lifts passing `filter`, fastest first (ties by id).
    fn rank_candidates(
        &self,
        floor: FloorId,
        filter: impl Fn(&LiftStatus) -> bool,
    ) -> Vec<(LiftHandle, f64)> {
        let mut ranked: Vec<(LiftHandle, f64)> = self
            .lift_handles()
            .into_iter()
            .filter_map(|handle| {
                let status = handle.status();
                if !filter(&status) {
                    return None;
                }
                let eta = self.estimate_time_to(&status, floor)?;
                Some((handle, eta))
            })
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)));
        ranked
    }

    /// Offers one passenger to each ranked lift until one accepts.
    ///
    /// Caller must hold the dispatch lock.
    async fn offer_in_rank_order(
        &self,
        passenger: PassengerId,
        floor: FloorId,
        direction: Direction,
        candidates: Vec<(LiftHandle, f64)>,
    ) -> Option<LiftId> {
        for (handle, eta) in candidates {
            match handle.offer(passenger, floor, direction).await {
                Ok(OfferReply::Accepted) => {
                    debug!(%passenger, lift = %handle.id, eta, "offer accepted");
                    self.emit(EventKind::Dispatched {
                        passenger,
                        lift: handle.id,
                    });
                    return Some(handle.id);
                }
                Ok(OfferReply::Declined(reason)) => {
                    debug!(%passenger, lift = %handle.id, ?reason, "offer declined");
                }
                Err(e) => {
                    warn!(%passenger, lift = %handle.id, error = %e, "offer not delivered");
                }
            }
        }
        None
    }

    /// Registers a new passenger and dispatches them.
    ///
    /// Returns once the dispatch search has finished; the outcome is
    /// visible through the passenger's candidates.
    pub async fn passenger_arrival(
        &self,
        source: FloorId,
        target: FloorId,
        trip_start: std::time::Duration,
    ) -> Result<PassengerId, PassengerError> {
        let id = self.register_passenger(source, target, trip_start)?;
        self.on_arrival(id).await;
        Ok(id)
    }

    /// Ranks same-direction and stationary lifts and offers them the passenger.
    pub async fn on_arrival(&self, passenger: PassengerId) -> Option<LiftId> {
        let _guard = self.dispatch_lock.lock().await;

        let p = self.passenger(passenger)?;
        if p.status != PassengerStatus::Waiting {
            return None;
        }

        let direction = p.direction;
        let candidates = self.rank_candidates(p.current, |status| {
            status.is_stationary() || status.direction == direction
        });
        let accepted = self
            .offer_in_rank_order(passenger, p.current, direction, candidates)
            .await;

        if accepted.is_none() {
            debug!(%passenger, "no lift accepted, passenger keeps waiting");
            self.emit(EventKind::Unassigned { passenger });
        }
        accepted
    }

    /// Offers still-unclaimed passengers at `floor` to parked lifts, one
    /// passenger at a time.
    pub async fn reassign_unclaimed(
        &self,
        floor: FloorId,
        passengers: Vec<PassengerId>,
    ) -> Vec<(PassengerId, LiftId)> {
        let _guard = self.dispatch_lock.lock().await;
        let mut assigned = Vec::new();

        for id in passengers {
            let Some(p) = self.passenger(id) else {
                continue;
            };
            if p.status != PassengerStatus::Waiting || !p.candidates.is_empty() || p.current != floor {
                continue;
            }
            let candidates = self.rank_candidates(floor, |status| {
                status.is_stationary() && status.spare_capacity() > 0
            });
            if candidates.is_empty() {
                break;
            }
            if let Some(lift) = self
                .offer_in_rank_order(id, floor, p.direction, candidates)
                .await
            {
                assigned.push((id, lift));
            }
        }

        assigned
    }

    /// Serves reassignment requests until the registry goes away.
    ///
    /// Only one listener can run per registry.
    pub async fn reassignment_listener(self: Arc<Self>) {
        let rx = self
            .reassign_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut rx) = rx else {
            warn!("reassignment listener already running");
            return;
        };

        while let Some(request) = rx.recv().await {
            match request {
                ReassignRequest::Released { floor, passengers } => {
                    let assigned = self.reassign_unclaimed(floor, passengers).await;
                    debug!(%floor, reassigned = assigned.len(), "released passengers reassigned");
                }
                ReassignRequest::LiftIdle(lift) => {
                    for (floor, passengers) in self.unclaimed_by_floor() {
                        let assigned = self.reassign_unclaimed(floor, passengers).await;
                        if !assigned.is_empty() {
                            debug!(%lift, %floor, reassigned = assigned.len(), "idle sweep");
                        }
                    }
                }
            }
        }
    }
}
