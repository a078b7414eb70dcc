//! Liftgroup Simulator CLI
//!
//! Run the scripted lift scenarios and seeded Poisson traffic on a virtual clock.

use clap::Parser;
use liftgroup_sim::{
    sim_epoch, FloorLayout, LedgerExport, ScenarioId, ScenarioResult, ScenarioRunner, SimConfig,
    TrafficProfile,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Liftgroup deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "liftgroup-sim")]
#[command(about = "Run deterministic lift group simulations", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (single_trip, redirect, shared_load, boundary_turn,
    /// capacity, stationary_on_arrival, u_turn, traffic, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to run (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum simulated duration in seconds (defaults to the config budget)
    #[arg(short, long)]
    duration: Option<f64>,

    /// JSON config file for the traffic scenario
    #[arg(short, long)]
    config: Option<String>,

    /// Number of lifts for the traffic scenario
    #[arg(short, long)]
    lifts: Option<usize>,

    /// Number of floors for the traffic scenario
    #[arg(short, long)]
    floors: Option<usize>,

    /// Lift capacity for the traffic scenario
    #[arg(long)]
    capacity: Option<usize>,

    /// Traffic profile (sparse, one_lift_busy, two_lifts_busy, five_lifts_busy)
    #[arg(short, long)]
    profile: Option<TrafficProfile>,

    /// Print every lift event as it happens
    #[arg(long)]
    events: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the passenger ledger of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

/// Loads the config file and applies command-line overrides.
fn build_config(args: &Args) -> SimConfig {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path).unwrap_or_else(|e| fail(e)),
        None => SimConfig::default(),
    };

    if let Some(lifts) = args.lifts {
        config.lifts = lifts;
    }
    if let Some(count) = args.floors {
        let spacing = match config.floors {
            FloorLayout::Uniform { spacing, .. } => spacing,
            FloorLayout::Heights(_) => FloorLayout::default_spacing(),
        };
        config.floors = FloorLayout::Uniform { count, spacing };
    }
    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    if let Some(profile) = args.profile {
        config.profile = profile;
    }
    if let Some(duration) = args.duration {
        config.budget_secs = duration;
    }
    if let Err(e) = config.validate() {
        fail(e);
    }
    config
}

fn export_ledger(result: &ScenarioResult, path: &str) {
    let export = LedgerExport::new(
        result.scenario.name(),
        result.seed,
        sim_epoch(),
        result.final_time_secs,
        result.ledger.clone(),
    );
    match export.write_to_file(path) {
        Ok(()) => info!("Exported {} passengers to {}", export.passengers.len(), path),
        Err(e) => error!("Failed to write export: {:?}", e),
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        fail(format!("failed to set tracing subscriber: {}", e));
    }

    if !args.json {
        info!("Liftgroup Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            eprintln!("Available scenarios: {}, all", names.join(", "));
            std::process::exit(1);
        })]
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        fail("--export only supports a single scenario and seed");
    }

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let config = build_config(&args);

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed)
            .with_config(config.clone())
            .with_events(args.events);

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED at t={:.1}s: {} delivered, mean wait {:.1}s",
                        scenario.name(),
                        seed,
                        result.final_time_secs,
                        result.metrics.summary.arrived,
                        result.metrics.summary.mean_waiting_time.unwrap_or(0.0)
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if let Some(path) = &args.export {
                export_ledger(&result, path);
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("All {} scenario runs passed", total);
        } else {
            error!("{}/{} scenario runs failed", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
