//! SimWorld - The simulation harness container.

use crate::arrivals::{self, ArrivalError, ArrivalGenerator};
use crate::config::{ConfigError, SimConfig};
use crate::context::SimContext;

use liftgroup_core::metrics::{self, PassengerRecord};
use liftgroup_core::{Lift, LiftConfig, LiftError, LiftEvent, PassengerError, PassengerRegistry};
use liftgroup_env::{FloorId, LiftContext, PassengerId};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Seed extension for the arrival stream
const ARRIVAL_STREAM: u64 = 0xA441;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lift(#[from] LiftError),

    #[error(transparent)]
    Arrival(#[from] ArrivalError),

    #[error(transparent)]
    Passenger(#[from] PassengerError),
}

/// Every event the building emitted, in order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LiftEvent>>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<LiftEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: LiftEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// The SimWorld - one building with its lifts, passengers and clock.
///
/// Must be built inside a paused runtime (see [`SimContext`]).
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    pub registry: Arc<PassengerRegistry<SimContext>>,

    pub log: EventLog,

    tasks: JoinSet<()>,
}

impl SimWorld {
    /// Builds floors, models and registry, and starts the event recorder
    /// and the reassignment listener. Lifts are added separately.
    pub fn new(config: SimConfig, print_events: bool) -> Result<Self, WorldError> {
        config.validate()?;
        let context = SimContext::shared(config.seed);
        let floors = Arc::new(config.floor_registry()?);
        let registry = Arc::new(PassengerRegistry::new(
            Arc::clone(&context),
            floors,
            config.movement_model()?,
        ));

        let mut world = Self {
            config,
            context,
            registry,
            log: EventLog::default(),
            tasks: JoinSet::new(),
        };
        world.spawn_recorder(print_events);
        world.tasks.spawn(Arc::clone(&world.registry).reassignment_listener());
        Ok(world)
    }

    fn spawn_recorder(&mut self, print_events: bool) {
        let mut events = self.registry.subscribe();
        let log = self.log.clone();
        self.tasks.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if print_events {
                            println!("{}", event);
                        }
                        log.push(event);
                    }
                    Err(RecvError::Lagged(missed)) => warn!(missed, "event recorder lagging"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Adds one lift and starts its loop.
    pub fn spawn_lift(&mut self, config: LiftConfig) -> Result<(), WorldError> {
        let lift = Lift::new(config, Arc::clone(&self.registry))?.with_boarding(self.config.boarding);
        let id = lift.id();
        self.tasks.spawn(async move {
            if let Err(e) = lift.run().await {
                error!(lift = %id, error = %e, "lift failed");
            }
        });
        Ok(())
    }

    /// Adds every lift the configuration describes.
    pub fn spawn_lifts(&mut self) -> Result<(), WorldError> {
        for config in self.config.lift_configs(self.registry.floors())? {
            self.spawn_lift(config)?;
        }
        Ok(())
    }

    /// Starts the seeded Poisson arrival process for the configured profile.
    pub fn spawn_arrivals(&mut self) -> Result<(), WorldError> {
        let trips = arrivals::trips(self.registry.floors(), self.config.profile);
        let generator = ArrivalGenerator::new(trips, self.context.derive_rng(ARRIVAL_STREAM))?;
        let window = self.config.arrival_window()?;
        self.tasks
            .spawn(generator.run(Arc::clone(&self.registry), window));
        Ok(())
    }

    /// Lets spawned tasks reach their first suspension point.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// Registers and dispatches one passenger now.
    pub async fn passenger(&self, source: usize, target: usize) -> Result<PassengerId, WorldError> {
        Ok(self
            .registry
            .passenger_arrival(FloorId(source), FloorId(target), self.context.now())
            .await?)
    }

    /// Advances the virtual clock, letting everything run.
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Runs until the budget expires. Lifts never finish on their own, so
    /// this is the normal way a run ends.
    pub async fn run_for(&mut self, budget: Duration) {
        let tasks = &mut self.tasks;
        let finished = tokio::time::timeout(budget, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "task ended abnormally");
                }
            }
        })
        .await;
        if finished.is_err() {
            info!(budget_secs = budget.as_secs_f64(), "budget expired");
        }
    }

    /// Stops every task and returns the passenger ledger.
    pub async fn shutdown(mut self) -> Vec<PassengerRecord> {
        self.registry.shutdown();
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        metrics::ledger(&self.registry)
    }
}
