//! Boarding-time model.
//!
//! Moving one passenger through the doors costs less while the car is
//! lightly loaded and more once it is congested. The cost of a boarding or
//! alighting phase is the per-passenger rate integrated over the occupancy
//! levels the car sweeps through, which makes it piecewise linear, convex
//! and continuous at the congestion threshold.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::motion::to_duration;

/// Seconds per passenger below the congestion threshold
pub const UNCONGESTED_SECS: f64 = 0.5;

/// Seconds per passenger above the congestion threshold
pub const CONGESTED_SECS: f64 = 1.5;

/// Fraction of capacity above which the car counts as congested
pub const CONGESTION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardingModel {
    pub uncongested_secs: f64,
    pub congested_secs: f64,
    pub congestion_threshold: f64,
}

impl Default for BoardingModel {
    fn default() -> Self {
        Self {
            uncongested_secs: UNCONGESTED_SECS,
            congested_secs: CONGESTED_SECS,
            congestion_threshold: CONGESTION_THRESHOLD,
        }
    }
}

impl BoardingModel {
    /// Seconds needed to go from `from` to `to` passengers on board.
    ///
    /// Works in both directions, so the same call prices alighting
    /// (`to < from`) and boarding (`to > from`).
    pub fn cost(&self, capacity: usize, from: usize, to: usize) -> f64 {
        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
        let (lo, hi) = (lo as f64, hi.min(capacity.max(lo)) as f64);
        let threshold = self.congestion_threshold * capacity as f64;

        let uncongested = (hi.min(threshold) - lo.max(0.0)).max(0.0);
        let congested = (hi - lo.max(threshold)).max(0.0);

        uncongested * self.uncongested_secs + congested * self.congested_secs
    }

    pub fn duration(&self, capacity: usize, from: usize, to: usize) -> Duration {
        to_duration(self.cost(capacity, from, to))
    }
}
