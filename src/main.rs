//! Demo entrypoint: builds one simulation run with default configuration,
//! runs it to completion, and appends one run-summary JSON line to stdout
//! (spec.md §6). CLI parsing, TOML loading, and the fuzzer driver are
//! external collaborators (spec.md §1 Non-goals); this binary only proves
//! the library wires together and runs.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

use sparse_blobsim::config::{CountryTable, SimulationConfig};
use sparse_blobsim::driver::Driver;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = SimulationConfig::default()
        .with_node_count(200)
        .with_mesh_degree(12)
        .with_seed(42)
        .with_duration(60.0);

    let timestamp_start = chrono::Utc::now();
    let wall_clock_start = std::time::Instant::now();

    let mut driver = Driver::build(config.clone(), CountryTable::default());

    info!(node_count = config.node_count, mesh_degree = config.mesh_degree, "driver built");

    let tx_hash = driver.broadcast_transaction(None, None);
    driver.run(config.duration);

    let results = driver
        .finalize_metrics()
        .context("metrics already finalized")?;

    let timestamp_end = chrono::Utc::now();
    let wall_clock_seconds = wall_clock_start.elapsed().as_secs_f64();

    info!(
        tx_hash = %tx_hash,
        median_propagation_time = results.median_propagation_time,
        propagation_success_rate = results.propagation_success_rate,
        "run finished"
    );

    let run_id = format!("run-{}-{}", config.seed, timestamp_start.timestamp_millis());
    let seed = config.seed;
    let simulated_seconds = config.duration;

    let summary = json!({
        "run_id": run_id,
        "seed": seed,
        "status": "success",
        "anomalies": Vec::<String>::new(),
        "metrics": results,
        "config": config,
        "wall_clock_seconds": wall_clock_seconds,
        "simulated_seconds": simulated_seconds,
        "timestamp_start": timestamp_start.to_rfc3339(),
        "timestamp_end": timestamp_end.to_rfc3339(),
    });

    println!("{summary}");
    Ok(())
}
