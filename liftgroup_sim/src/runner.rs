//! Scenario runner - executes lift scenarios on a paused clock.

use crate::config::{FloorLayout, SimConfig};
use crate::scenarios::ScenarioId;
use crate::world::{SimWorld, WorldError};

use liftgroup_core::metrics::{self, LedgerSummary, PassengerRecord};
use liftgroup_core::{
    check_invariants, Direction, EventKind, LiftEvent, LiftStatus, Passenger, PassengerStatus,
};
use liftgroup_env::{FloorId, LiftContext, LiftId, PassengerId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Passenger ledger at shutdown
    pub ledger: Vec<PassengerRecord>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    pub dispatched: u64,

    /// Arrivals no lift accepted straight away
    pub unassigned: u64,

    pub redirects: u64,

    pub boardings: u64,

    /// Largest load any car carried
    pub max_onboard: usize,

    pub summary: LedgerSummary,
}

impl ScenarioMetrics {
    fn collect(events: &[LiftEvent], ledger: &[PassengerRecord]) -> Self {
        let mut metrics = ScenarioMetrics {
            summary: LedgerSummary::from_records(ledger),
            ..Default::default()
        };
        let mut load: BTreeMap<LiftId, usize> = BTreeMap::new();

        for event in events {
            match &event.kind {
                EventKind::Dispatched { .. } => metrics.dispatched += 1,
                EventKind::Unassigned { .. } => metrics.unassigned += 1,
                EventKind::Redirected { .. } => metrics.redirects += 1,
                EventKind::Boarded { lift, .. } => {
                    metrics.boardings += 1;
                    let n = load.entry(*lift).or_default();
                    *n += 1;
                    metrics.max_onboard = metrics.max_onboard.max(*n);
                }
                EventKind::Alighted { lift, .. } => {
                    let n = load.entry(*lift).or_default();
                    *n = n.saturating_sub(1);
                }
                _ => {}
            }
        }
        metrics
    }
}

#[derive(Debug, Error)]
enum ScenarioFailure {
    #[error(transparent)]
    World(#[from] WorldError),

    #[error("{0}")]
    Check(String),
}

type Check = Result<(), ScenarioFailure>;

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Check {
    if condition {
        Ok(())
    } else {
        Err(ScenarioFailure::Check(reason()))
    }
}

fn passenger(world: &SimWorld, id: PassengerId) -> Result<Passenger, ScenarioFailure> {
    world
        .registry
        .passenger(id)
        .ok_or_else(|| ScenarioFailure::Check(format!("{} missing from registry", id)))
}

fn first_lift(world: &SimWorld) -> Result<LiftStatus, ScenarioFailure> {
    world
        .registry
        .lift_handles()
        .first()
        .map(|handle| handle.status())
        .ok_or_else(|| ScenarioFailure::Check("no lift registered".to_string()))
}

fn delivered(world: &SimWorld, id: PassengerId) -> Result<Passenger, ScenarioFailure> {
    let p = passenger(world, id)?;
    ensure(p.status == PassengerStatus::Arrived, || {
        format!("{} not delivered ({:?})", id, p.status)
    })?;
    Ok(p)
}

/// (floor, direction) of every stop `lift` made, in order.
fn stops(world: &SimWorld, lift: LiftId) -> Vec<(FloorId, Direction)> {
    world
        .log
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::LiftArrived {
                lift: l,
                floor,
                direction,
            } if l == lift => Some((floor, direction)),
            _ => None,
        })
        .collect()
}

const L1: LiftId = LiftId(1);
const L2: LiftId = LiftId(2);

/// Runs lift scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Settings for the traffic scenario
    config: SimConfig,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Print the event stream while running
    print_events: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: SimConfig {
                seed,
                ..Default::default()
            },
            max_duration_secs: 1800.0,
            print_events: false,
        }
    }

    /// Uses `config` for the traffic scenario. The runner's seed wins.
    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.max_duration_secs = config.budget_secs;
        self.config = SimConfig {
            seed: self.seed,
            ..config
        };
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_events(mut self, print_events: bool) -> Self {
        self.print_events = print_events;
        self
    }

    /// Small building with slow cars used by the scripted scenarios.
    fn scripted(&self, floors: usize, lifts: usize) -> SimConfig {
        SimConfig {
            seed: self.seed,
            floors: FloorLayout::Uniform {
                count: floors,
                spacing: 3.0,
            },
            lifts,
            acceleration: 1.0,
            max_velocity: 2.0,
            ..Default::default()
        }
    }

    fn scenario_config(&self, scenario: ScenarioId) -> SimConfig {
        match scenario {
            ScenarioId::SingleTrip
            | ScenarioId::Redirect
            | ScenarioId::StationaryOnArrival
            | ScenarioId::UTurn => self.scripted(6, 1),
            ScenarioId::SharedLoad => self.scripted(6, 2),
            ScenarioId::BoundaryTurn => SimConfig {
                home_floor: 4,
                home_direction: Direction::Down,
                ..self.scripted(5, 1)
            },
            ScenarioId::Capacity => SimConfig {
                capacity: 2,
                ..self.scripted(4, 1)
            },
            ScenarioId::Traffic => SimConfig {
                arrival_window_secs: self.config.arrival_window_secs.min(self.max_duration_secs),
                budget_secs: self.max_duration_secs,
                ..self.config.clone()
            },
        }
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build();
        match runtime {
            Ok(runtime) => runtime.block_on(self.run_async(scenario)),
            Err(e) => self.failed(scenario, format!("Failed to build runtime: {}", e)),
        }
    }

    fn failed(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
            ledger: Vec::new(),
        }
    }

    async fn run_async(&self, scenario: ScenarioId) -> ScenarioResult {
        let mut world = match SimWorld::new(self.scenario_config(scenario), self.print_events) {
            Ok(world) => world,
            Err(e) => return self.failed(scenario, e.to_string()),
        };

        let outcome = self.drive(scenario, &mut world).await;

        let final_time_secs = world.context.now().as_secs_f64();
        let log = world.log.clone();
        // Lifts still hold their published status until shutdown
        let report = check_invariants(&world.registry);
        debug!(%report, "invariants checked");
        let snapshot = metrics::snapshot(&world.registry);
        debug!(%snapshot, "final building state");
        if self.print_events {
            println!("{}", snapshot);
        }
        let ledger = world.shutdown().await;

        let failure_reason = match outcome {
            Err(e) => Some(e.to_string()),
            Ok(()) if !report.is_ok() => Some(report.to_string()),
            Ok(()) => None,
        };
        let metrics = ScenarioMetrics::collect(&log.events(), &ledger);

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            final_time_secs,
            failure_reason,
            metrics,
            ledger,
        }
    }

    async fn drive(&self, scenario: ScenarioId, world: &mut SimWorld) -> Check {
        world.spawn_lifts()?;
        world.settle().await;

        match scenario {
            ScenarioId::SingleTrip => self.run_single_trip(world).await,
            ScenarioId::Redirect => self.run_redirect(world).await,
            ScenarioId::SharedLoad => self.run_shared_load(world).await,
            ScenarioId::BoundaryTurn => self.run_boundary_turn(world).await,
            ScenarioId::Capacity => self.run_capacity(world).await,
            ScenarioId::StationaryOnArrival => self.run_stationary_on_arrival(world).await,
            ScenarioId::UTurn => self.run_u_turn(world).await,
            ScenarioId::Traffic => self.run_traffic(world).await,
        }
    }

    /// One passenger 0 -> 5. Timestamps must be ordered and the ride
    /// must take the modelled travel time.
    async fn run_single_trip(&self, world: &mut SimWorld) -> Check {
        let id = world.passenger(0, 5).await?;
        world.run_for(Duration::from_secs(60)).await;

        let p = delivered(world, id)?;
        ensure(p.lift == Some(L1), || format!("{} rode {:?}", id, p.lift))?;
        let (Some(board), Some(arrival)) = (p.board_time, p.arrival_time) else {
            return Err(ScenarioFailure::Check(format!("{} has no timeline", id)));
        };
        ensure(p.trip_start <= board && board <= arrival, || {
            format!("{} timeline out of order", id)
        })?;

        let model = world.registry.model();
        let boarding = world.config.boarding.cost(world.config.capacity, 0, 1);
        let expected = boarding + model.travel_time(15.0);
        let ride = (arrival - board).as_secs_f64();
        ensure((ride - expected).abs() < 0.01, || {
            format!("ride took {:.3}s, expected {:.3}s", ride, expected)
        })
    }

    /// Lift heading 0 -> 5 accepts a passenger appearing at 3 two seconds in.
    async fn run_redirect(&self, world: &mut SimWorld) -> Check {
        let first = world.passenger(0, 5).await?;
        world.advance(Duration::from_secs(2)).await;
        let second = world.passenger(3, 4).await?;
        world.run_for(Duration::from_secs(60)).await;

        let redirected = world.log.events().iter().any(|e| {
            matches!(
                e.kind,
                EventKind::Redirected { from, to, .. } if from == FloorId(5) && to == FloorId(3)
            )
        });
        ensure(redirected, || "no redirect from 005 to 003".to_string())?;

        let floors: Vec<FloorId> = stops(world, L1).into_iter().map(|s| s.0).collect();
        ensure(floors == [FloorId(0), FloorId(3), FloorId(4), FloorId(5)], || {
            format!("unexpected stops {:?}", floors)
        })?;

        for id in [first, second] {
            let p = delivered(world, id)?;
            ensure(p.lift == Some(L1), || format!("{} rode {:?}", id, p.lift))?;
        }
        Ok(())
    }

    /// P1 1->2 at t=0, then P2 2->3 and P3 1->3 at t=1 with two lifts.
    async fn run_shared_load(&self, world: &mut SimWorld) -> Check {
        let a = world.passenger(1, 2).await?;
        world.advance(Duration::from_secs(1)).await;
        let b = world.passenger(2, 3).await?;
        let c = world.passenger(1, 3).await?;
        world.run_for(Duration::from_secs(60)).await;

        let mut lifts = Vec::new();
        for id in [a, b, c] {
            lifts.push(delivered(world, id)?.lift);
        }
        ensure(lifts == [Some(L1), Some(L2), Some(L1)], || {
            format!("assignments {:?}, expected [L1, L2, L1]", lifts)
        })
    }

    /// Lift parked at the top floor serves 3->4 and faces Up on reaching 3.
    async fn run_boundary_turn(&self, world: &mut SimWorld) -> Check {
        let id = world.passenger(3, 4).await?;
        world.run_for(Duration::from_secs(30)).await;

        delivered(world, id)?;
        let stops = stops(world, L1);
        ensure(stops.first() == Some(&(FloorId(3), Direction::Up)), || {
            format!("first stop {:?}, expected 003 heading Up", stops.first())
        })
    }

    /// Three passengers at the lobby, two seats.
    async fn run_capacity(&self, world: &mut SimWorld) -> Check {
        let ids = [
            world.passenger(0, 1).await?,
            world.passenger(0, 1).await?,
            world.passenger(0, 1).await?,
        ];
        let status = first_lift(world)?;
        ensure(status.onboard <= 2, || format!("{} riders in a two-seat car", status.onboard))?;
        world.run_for(Duration::from_secs(60)).await;

        let metrics = ScenarioMetrics::collect(&world.log.events(), &[]);
        ensure(metrics.max_onboard <= 2, || {
            format!("car carried {} at once", metrics.max_onboard)
        })?;
        for id in ids {
            delivered(world, id)?;
        }
        Ok(())
    }

    /// After its last drop-off the lift is Stationary, then serves 2->0.
    async fn run_stationary_on_arrival(&self, world: &mut SimWorld) -> Check {
        let first = world.passenger(0, 3).await?;
        world.advance(Duration::from_secs(30)).await;
        delivered(world, first)?;

        let status = first_lift(world)?;
        ensure(status.direction == Direction::Stationary, || {
            format!("lift is {:?} after its last drop-off", status.direction)
        })?;

        let second = world.passenger(2, 0).await?;
        world.run_for(Duration::from_secs(30)).await;
        delivered(world, second)?;
        ensure(stops(world, L1).contains(&(FloorId(2), Direction::Down)), || {
            "lift never stopped at 002 heading Down".to_string()
        })
    }

    /// Up-bound car passes a down call; it serves it after turning around.
    async fn run_u_turn(&self, world: &mut SimWorld) -> Check {
        let up = world.passenger(0, 5).await?;
        world.advance(Duration::from_secs(6)).await;
        let down = world.passenger(2, 0).await?;
        world.run_for(Duration::from_secs(60)).await;

        let pu = delivered(world, up)?;
        let pd = delivered(world, down)?;
        ensure(pd.board_time >= pu.arrival_time, || {
            format!("{} boarded before {} was dropped at the top", down, up)
        })
    }

    /// Poisson traffic until the budget runs out.
    async fn run_traffic(&self, world: &mut SimWorld) -> Check {
        world.spawn_arrivals()?;
        let budget = world.config.budget().map_err(WorldError::from)?;
        world.run_for(budget).await;

        let arrivals = world
            .log
            .events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::PassengerArrived { .. }))
            .count();
        ensure(arrivals == world.registry.len(), || {
            format!(
                "{} arrival events for {} passengers",
                arrivals,
                world.registry.len()
            )
        })
    }
}
