//! End-to-End Test Runner for Fleetbus

use anyhow::{bail, Result};
use clap::Parser;
use fleetbus_e2e_tests::{
    BroadcastScenario, ChunkedDirectedScenario, RejectionScenario, TestConfig, TestFramework,
    TestScenario,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario to run (broadcast, chunked_directed, rejection, all)
    #[arg(short, long, default_value = "all")]
    scenario: String,

    /// Scenario timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Write results as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Skip cleanup after each scenario
    #[arg(long)]
    no_cleanup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    info!("Starting Fleetbus E2E Test Suite");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let framework = TestFramework::new(TestConfig {
        timeout_secs: args.timeout,
        cleanup: !args.no_cleanup,
    });

    let scenarios: Vec<Box<dyn TestScenario>> = match args.scenario.as_str() {
        "broadcast" => vec![Box::new(BroadcastScenario::new(5))],
        "chunked_directed" => vec![Box::new(ChunkedDirectedScenario::new(450, vec![0, 199, 200, 449]))],
        "rejection" => vec![Box::new(RejectionScenario::new())],
        "all" => vec![
            Box::new(BroadcastScenario::new(5)),
            Box::new(ChunkedDirectedScenario::new(450, vec![0, 199, 200, 449])),
            Box::new(RejectionScenario::new()),
        ],
        other => bail!("Unknown scenario: {}", other),
    };

    let results = framework.run_all(&scenarios).await;

    for result in &results {
        match &result.error_message {
            None => info!(
                "PASS {} in {:?} ({} replies)",
                result.scenario_name, result.duration, result.metrics.replies_received
            ),
            Some(message) => error!("FAIL {}: {}", result.scenario_name, message),
        }
    }

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&results)?)?;
        info!("Results written to {:?}", path);
    }

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        bail!("{} of {} scenarios failed", failed, results.len());
    }
    info!("All {} scenarios passed", results.len());
    Ok(())
}
