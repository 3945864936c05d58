//! Omnisweep Simulator
//!
//! Runs sweep scenarios end to end over an in-memory network that
//! duplicates and reorders messages.

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod scenario;

use omnisweep_common::CountingMode;

use controller::{SimulationController, SimulationOptions};
use scenario::Scenario;

/// Omnisweep Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Omnisweep protocol simulation environment")]
struct Args {
    /// Scenario to run; all of them when omitted
    #[arg(short, long, value_enum)]
    scenario: Option<Scenario>,

    /// Number of remote domains
    #[arg(short, long, default_value = "2")]
    remotes: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Probability that a message is delivered one extra time
    #[arg(long, default_value = "0.0")]
    duplicate_rate: f64,

    /// Count every notice, duplicates included
    #[arg(long)]
    legacy_counting: bool,

    /// Asset amount each domain sweeps
    #[arg(long, default_value = "500")]
    amount: u64,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Omnisweep Simulator");
    info!("Remotes: {}", args.remotes);
    info!("Duplicate rate: {}", args.duplicate_rate);

    let controller = SimulationController::new(SimulationOptions {
        remotes: args.remotes,
        seed: args.seed,
        duplicate_rate: args.duplicate_rate,
        counting_mode: if args.legacy_counting {
            CountingMode::Legacy
        } else {
            CountingMode::Idempotent
        },
        amount: args.amount,
    })?;

    let scenarios = match args.scenario {
        Some(scenario) => vec![scenario],
        None => Scenario::all().to_vec(),
    };

    for scenario in scenarios {
        let report = controller.run_scenario(scenario).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        if !report.fully_settled() {
            warn!(
                scenario = %scenario,
                status = ?report.status,
                delivered = %report.delivered_value,
                expected = %report.expected_value,
                "Scenario did not fully settle"
            );
        }
        for note in &report.notes {
            info!(scenario = %scenario, "{}", note);
        }
    }

    for domain in controller.remote_domains() {
        if let Some(worker) = controller.worker(domain) {
            info!(
                domain = %domain,
                stats = ?worker.stats(),
                reserve = %worker.fee_reserve(),
                "Worker summary"
            );
        }
    }

    // Print metrics
    let metrics = controller.metrics().await;
    info!("Simulation complete");
    info!("Operations run: {}", metrics.operations_run);
    info!("Finalized: {}", metrics.operations_finalized);
    info!("Partially settled: {}", metrics.operations_partially_settled);
    info!("Left open: {}", metrics.operations_open);
    info!(
        "Deliveries: {} ({} duplicates injected, {} failed)",
        metrics.messages_delivered, metrics.duplicates_injected, metrics.deliveries_failed
    );
    info!("Average deliveries per operation: {}", metrics.average_deliveries());
    info!("P99 deliveries per operation: {}", metrics.p99_deliveries());
    info!("Finalize rate: {:.2}", metrics.finalize_rate());
    info!("Coordinator metrics:\n{}", controller.coordinator().metrics().to_prometheus());

    Ok(())
}
