//! Simulation configuration, loadable from JSON.

use liftgroup_core::motion::{DEFAULT_ACCELERATION, DEFAULT_MAX_VELOCITY};
use liftgroup_core::{BoardingModel, Direction, FloorError, FloorRegistry, LiftConfig, MotionError, MovementModel};
use liftgroup_env::{FloorId, LiftId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::arrivals::TrafficProfile;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Floor(#[from] FloorError),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error("At least one lift is required")]
    NoLifts,

    #[error("Lift capacity must be at least 1")]
    ZeroCapacity,

    #[error("Home floor {0} is outside the building")]
    HomeFloor(usize),

    #[error("Invalid time setting {name}: {value}")]
    InvalidTime { name: &'static str, value: f64 },
}

/// How floors are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FloorLayout {
    Uniform { count: usize, spacing: f64 },
    Heights(Vec<f64>),
}

impl FloorLayout {
    /// Metres between floors when none is given.
    pub fn default_spacing() -> f64 {
        3.0
    }
}

impl Default for FloorLayout {
    fn default() -> Self {
        FloorLayout::Uniform {
            count: 20,
            spacing: FloorLayout::default_spacing(),
        }
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    pub floors: FloorLayout,

    /// Number of lifts, named L1..Ln
    pub lifts: usize,

    pub capacity: usize,

    pub home_floor: usize,

    pub home_direction: Direction,

    /// m/s²
    pub acceleration: f64,

    /// m/s
    pub max_velocity: f64,

    pub boarding: BoardingModel,

    pub profile: TrafficProfile,

    /// Passengers stop arriving after this many seconds
    pub arrival_window_secs: f64,

    /// Hard stop for the whole run
    pub budget_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            floors: FloorLayout::default(),
            lifts: 5,
            capacity: 12,
            home_floor: 0,
            home_direction: Direction::Up,
            acceleration: DEFAULT_ACCELERATION,
            max_velocity: DEFAULT_MAX_VELOCITY,
            boarding: BoardingModel::default(),
            profile: TrafficProfile::Sparse,
            arrival_window_secs: 1680.0,
            budget_secs: 1800.0,
        }
    }
}

fn secs(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidTime { name, value })
}

impl SimConfig {
    /// Loads a JSON config; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn floor_registry(&self) -> Result<FloorRegistry, ConfigError> {
        Ok(match &self.floors {
            FloorLayout::Uniform { count, spacing } => FloorRegistry::uniform(*count, *spacing)?,
            FloorLayout::Heights(heights) => FloorRegistry::from_heights(heights)?,
        })
    }

    pub fn movement_model(&self) -> Result<MovementModel, ConfigError> {
        Ok(MovementModel::new(self.acceleration, self.max_velocity)?)
    }

    pub fn lift_configs(&self, floors: &FloorRegistry) -> Result<Vec<LiftConfig>, ConfigError> {
        if self.lifts == 0 {
            return Err(ConfigError::NoLifts);
        }
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !floors.contains(FloorId(self.home_floor)) {
            return Err(ConfigError::HomeFloor(self.home_floor));
        }
        Ok((1..=self.lifts)
            .map(|n| {
                LiftConfig::new(LiftId(n as u32))
                    .with_capacity(self.capacity)
                    .with_home(FloorId(self.home_floor), self.home_direction)
            })
            .collect())
    }

    pub fn arrival_window(&self) -> Result<Duration, ConfigError> {
        secs("arrival_window_secs", self.arrival_window_secs)
    }

    pub fn budget(&self) -> Result<Duration, ConfigError> {
        secs("budget_secs", self.budget_secs)
    }

    /// Checks every derived setting at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let floors = self.floor_registry()?;
        self.movement_model()?;
        self.lift_configs(&floors)?;
        self.arrival_window()?;
        self.budget()?;
        Ok(())
    }
}
