// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! EMBus Persistence Service CLI
//!
//! Periodically flushes bus channel values to InfluxDB. The external bus
//! is out of scope for the binary; updates are read as line-delimited
//! JSON from stdin and fed through the listener surface.
//!
//! # Usage
//!
//! ```bash
//! # Flush to a local InfluxDB every 10 seconds, tagging fleet 42
//! embus-persistence --endpoint 127.0.0.1 --fleet 42
//!
//! # Load settings from YAML, override the cycle on the command line
//! embus-persistence --config persist.yaml --cycle-ms 5000
//!
//! # Dry-run against an in-memory sink
//! embus-persistence --mock
//! ```
//!
//! Update format, one per line:
//!
//! ```text
//! {"channel": "ess0/ActivePower", "value": 3500}
//! ```

use anyhow::Result;
use clap::Parser;
use embus_persistence::{
    BusListener, Config, Connector, HttpConnector, MockConnector, PersistenceService,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "embus-persistence")]
#[command(about = "EMBus Persistence Service - periodic InfluxDB flush of bus channel values", long_about = None)]
struct Args {
    /// InfluxDB endpoint: bare host (port 8086 assumed) or http URL
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Fleet identifier written as the `fleet` tag on every point
    #[arg(short, long)]
    fleet: Option<u32>,

    /// InfluxDB username
    #[arg(long)]
    username: Option<String>,

    /// InfluxDB password
    #[arg(long)]
    password: Option<String>,

    /// Flush cycle in milliseconds (also the bucket width)
    #[arg(long)]
    cycle_ms: Option<u64>,

    /// YAML configuration file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use an in-memory sink instead of HTTP (for testing without InfluxDB)
    #[arg(long)]
    mock: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    tracing::info!("EMBus Persistence Service starting...");
    match &config.endpoint {
        Some(endpoint) => tracing::info!("  Endpoint: {}", endpoint),
        None => tracing::info!("  Endpoint: (unconfigured)"),
    }
    if let Some(fleet) = config.fleet_id {
        tracing::info!("  Fleet: {}", fleet);
    }
    tracing::info!("  Cycle: {} ms", config.cycle_ms);

    let connector: Box<dyn Connector> = if args.mock {
        tracing::info!("Running with in-memory sink");
        Box::new(MockConnector::new())
    } else {
        Box::new(HttpConnector)
    };

    let service = Arc::new(PersistenceService::new(config, connector));
    let shutdown = Arc::new(AtomicBool::new(false));

    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    let runner = {
        let service = Arc::clone(&service);
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || run_scheduler(&service, &shutdown))
    };

    feed_stdin(service.as_ref(), &shutdown);

    shutdown.store(true, Ordering::SeqCst);
    if runner.join().is_err() {
        tracing::error!("scheduler thread panicked");
    }

    let stats = service.stats();
    tracing::info!(
        "Done: {} cycles, {} points written, {} values discarded, {} write errors",
        stats.cycles,
        stats.points_written,
        stats.values_discarded,
        stats.write_errors
    );

    Ok(())
}

/// Merge the YAML file (if any) with command-line overrides.
fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(endpoint) = &args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(fleet) = args.fleet {
        config.fleet_id = Some(fleet);
    }
    if let Some(username) = &args.username {
        config.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(cycle_ms) = args.cycle_ms {
        config.cycle_ms = cycle_ms;
    }

    // The mock sink accepts anything; fill the connection gate so a bare
    // `--mock` run is immediately ready.
    if args.mock {
        config.endpoint.get_or_insert_with(|| "memory".to_string());
        config.fleet_id.get_or_insert(0);
    }

    Ok(config)
}

/// Scheduler loop: attempt initialization until the first connection
/// succeeds, then run one flush per cycle. At most one flush is ever in
/// flight.
fn run_scheduler(service: &PersistenceService, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        sleep_cycle(service.config().cycle_ms, shutdown);
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if !service.initialize() {
            continue;
        }
        let outcome = service.flush_once();
        tracing::trace!("flush cycle: {:?}", outcome);
    }

    // Final flush attempt so a clean shutdown does not drop the last bucket
    if service.is_ready() {
        let outcome = service.flush_once();
        tracing::debug!("final flush: {:?}", outcome);
    }
}

/// Sleep one cycle in short slices so shutdown stays responsive.
fn sleep_cycle(cycle_ms: u64, shutdown: &AtomicBool) {
    let deadline = Instant::now() + Duration::from_millis(cycle_ms);
    while Instant::now() < deadline && !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100.min(cycle_ms.max(1))));
    }
}

/// Feed line-delimited JSON updates from stdin through the listener.
fn feed_stdin(service: &PersistenceService, shutdown: &AtomicBool) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(update) => {
                let Some(channel) = update.get("channel").and_then(|c| c.as_str()) else {
                    tracing::warn!("ignoring update without channel: {}", line);
                    continue;
                };
                service.on_update(channel, false, update.get("value"));
            }
            Err(e) => tracing::warn!("ignoring malformed update: {}", e),
        }
    }
}
