//! JSON exporter for passenger ledgers.
//!
//! Writes one run's passenger records plus summary figures, sorted the way
//! the ledger is usually read: by status, direction, source floor and
//! arrival time.

use liftgroup_core::metrics::{LedgerSummary, PassengerRecord};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::time::SystemTime;

/// Complete ledger export for one run.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Wall-clock stamp of virtual time zero
    pub started_at: SystemTime,

    /// Simulated duration in seconds
    pub duration_secs: f64,

    pub summary: LedgerSummary,

    pub passengers: Vec<PassengerRecord>,
}

impl LedgerExport {
    /// Creates an export and sorts its rows.
    pub fn new(
        scenario: &str,
        seed: u64,
        started_at: SystemTime,
        duration_secs: f64,
        mut passengers: Vec<PassengerRecord>,
    ) -> Self {
        passengers.sort_by(|a, b| {
            (a.status, a.direction, a.source)
                .cmp(&(b.status, b.direction, b.source))
                .then(a.trip_start.total_cmp(&b.trip_start))
                .then(a.id.cmp(&b.id))
        });
        Self {
            scenario: scenario.to_string(),
            seed,
            started_at,
            duration_secs,
            summary: LedgerSummary::from_records(&passengers),
            passengers,
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
