//! Poisson passenger arrivals.
//!
//! Every ordered pair of distinct floors is a trip with its own arrival
//! rate (passengers per second). Trips touching the lobby get the lobby
//! rate. The superposition of all those processes is one Poisson process
//! with the summed rate, so the generator draws a single exponential gap
//! and then picks the trip in proportion to its rate.

use liftgroup_core::motion::to_duration;
use liftgroup_core::{FloorRegistry, PassengerRegistry};
use liftgroup_env::{FloorId, LiftContext};
use rand::distributions::{Distribution, WeightedIndex};
use rand_chacha::ChaCha8Rng;
use rand_distr::Exp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ArrivalError {
    #[error("No trips to generate")]
    NoTrips,

    #[error("Invalid arrival rates: {0}")]
    Rates(String),
}

/// Named traffic levels, as (lobby, inter-floor) rates per trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficProfile {
    #[default]
    Sparse,
    OneLiftBusy,
    TwoLiftsBusy,
    FiveLiftsBusy,
}

impl TrafficProfile {
    pub fn all() -> Vec<TrafficProfile> {
        vec![
            TrafficProfile::Sparse,
            TrafficProfile::OneLiftBusy,
            TrafficProfile::TwoLiftsBusy,
            TrafficProfile::FiveLiftsBusy,
        ]
    }

    /// (lobby trip rate, inter-floor trip rate)
    pub fn rates(&self) -> (f64, f64) {
        match self {
            TrafficProfile::Sparse => (0.00005, 0.00005),
            TrafficProfile::OneLiftBusy => (0.003, 0.0002),
            TrafficProfile::TwoLiftsBusy => (0.006, 0.0004),
            TrafficProfile::FiveLiftsBusy => (0.012, 0.001),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrafficProfile::Sparse => "sparse",
            TrafficProfile::OneLiftBusy => "one_lift_busy",
            TrafficProfile::TwoLiftsBusy => "two_lifts_busy",
            TrafficProfile::FiveLiftsBusy => "five_lifts_busy",
        }
    }
}

impl std::fmt::Display for TrafficProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TrafficProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrafficProfile::all()
            .into_iter()
            .find(|p| p.name() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown traffic profile: {}", s))
    }
}

/// One origin-destination pair and its arrival rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trip {
    pub source: FloorId,
    pub target: FloorId,
    pub rate: f64,
}

/// Builds every trip of the building with the profile's rates.
pub fn trips(floors: &FloorRegistry, profile: TrafficProfile) -> Vec<Trip> {
    let (lobby_rate, floor_rate) = profile.rates();
    let lobby = floors.lowest();
    let mut trips = Vec::new();
    for source in floors.ids() {
        for target in floors.ids() {
            if source == target {
                continue;
            }
            let rate = if source == lobby || target == lobby {
                lobby_rate
            } else {
                floor_rate
            };
            trips.push(Trip {
                source,
                target,
                rate,
            });
        }
    }
    trips
}

pub struct ArrivalGenerator {
    trips: Vec<Trip>,
    gap: Exp<f64>,
    pick: WeightedIndex<f64>,
    rng: ChaCha8Rng,
}

impl ArrivalGenerator {
    pub fn new(trips: Vec<Trip>, rng: ChaCha8Rng) -> Result<Self, ArrivalError> {
        if trips.is_empty() {
            return Err(ArrivalError::NoTrips);
        }
        let total: f64 = trips.iter().map(|t| t.rate).sum();
        let gap = Exp::new(total).map_err(|e| ArrivalError::Rates(e.to_string()))?;
        let pick = WeightedIndex::new(trips.iter().map(|t| t.rate))
            .map_err(|e| ArrivalError::Rates(e.to_string()))?;
        Ok(Self {
            trips,
            gap,
            pick,
            rng,
        })
    }

    /// Passengers per second across all trips.
    pub fn total_rate(&self) -> f64 {
        self.trips.iter().map(|t| t.rate).sum()
    }

    /// Time until the next passenger, and their trip.
    pub fn next_arrival(&mut self) -> (Duration, Trip) {
        let gap = self.gap.sample(&mut self.rng);
        let trip = self.trips[self.pick.sample(&mut self.rng)];
        (to_duration(gap), trip)
    }

    /// Feeds arrivals into the registry until `window` has passed.
    ///
    /// Each passenger is dispatched in a task of its own so a slow
    /// dispatch never delays the next arrival.
    pub async fn run<Ctx: LiftContext>(mut self, registry: Arc<PassengerRegistry<Ctx>>, window: Duration) {
        let context = Arc::clone(registry.context());
        info!(rate = self.total_rate(), window_secs = window.as_secs_f64(), "arrivals started");
        let mut generated = 0u64;

        loop {
            let (gap, trip) = self.next_arrival();
            if context.now() + gap > window {
                break;
            }
            context.sleep(gap).await;

            let trip_start = context.now();
            let registry = Arc::clone(&registry);
            context.spawn("arrival", async move {
                if let Err(e) = registry
                    .passenger_arrival(trip.source, trip.target, trip_start)
                    .await
                {
                    warn!(error = %e, "arrival rejected");
                }
            });
            generated += 1;
            debug!(source = %trip.source, target = %trip.target, "passenger generated");
        }

        info!(generated, "arrival window closed");
    }
}
