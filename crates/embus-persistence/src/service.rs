// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flush cycle and service wiring.
//!
//! # Operation (per cycle)
//!
//! 1. Acquire the sink connection (lazily established, cached).
//! 2. Without a connection, clear the queue: pending data is dropped so
//!    memory stays bounded during a sink outage.
//! 3. With a connection, drain the queue and issue one batch write
//!    carrying one data point per bucket, tagged with the fleet
//!    identifier.
//! 4. A failed write is logged and counted; the drained data is not
//!    re-queued.
//!
//! The write is blocking and synchronous within the cycle; a hanging sink
//! stalls subsequent cycles.

use crate::config::Config;
use crate::connection::{ConnectionManager, Connector};
use crate::listener::BusListener;
use crate::queue::{bucket_key, BucketQueue};
use arc_swap::ArcSwap;
use embus_influx::{classify, DataPoint};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Target database, created if absent at connect time.
pub const DB_NAME: &str = "db";

/// Measurement all channel values are written under.
pub const MEASUREMENT: &str = "data";

/// Tag key carrying the fleet identifier.
pub const FLEET_TAG: &str = "fleet";

/// Outcome of a single flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No sink connection; pending values were discarded to bound memory.
    NotConnected { values_discarded: usize },
    /// Connected but nothing was pending; no write issued.
    Empty,
    /// One batch write succeeded.
    Written { points: usize },
    /// The batch write failed; the drained points are lost.
    WriteFailed { points_lost: usize },
}

/// Cumulative service counters.
#[derive(Debug, Default)]
struct ServiceStats {
    cycles: AtomicU64,
    points_written: AtomicU64,
    values_discarded: AtomicU64,
    write_errors: AtomicU64,
    updates_queued: AtomicU64,
    updates_ignored: AtomicU64,
}

/// Point-in-time copy of the service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Flush cycles run.
    pub cycles: u64,
    /// Data points written successfully.
    pub points_written: u64,
    /// Field values dropped (outage clears and failed writes).
    pub values_discarded: u64,
    /// Failed batch writes.
    pub write_errors: u64,
    /// Updates accepted into the queue.
    pub updates_queued: u64,
    /// Updates rejected at the listener (config channels, absent values,
    /// unsupported types).
    pub updates_ignored: u64,
}

impl ServiceStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            values_discarded: self.values_discarded.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            updates_queued: self.updates_queued.load(Ordering::Relaxed),
            updates_ignored: self.updates_ignored.load(Ordering::Relaxed),
        }
    }
}

/// Periodic InfluxDB persistence for bus channel values.
///
/// Producer side (`on_update` / `ingest_at`) is called from bus dispatch
/// threads; consumer side (`initialize` / `flush_once`) from a single
/// scheduler thread, at most one cycle in flight at a time.
pub struct PersistenceService {
    config: ArcSwap<Config>,
    queue: BucketQueue,
    connection: Mutex<ConnectionManager>,
    ready: AtomicBool,
    stats: ServiceStats,
}

impl PersistenceService {
    /// Create a service flushing through the given connector.
    pub fn new(config: Config, connector: Box<dyn Connector>) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            queue: BucketQueue::new(),
            connection: Mutex::new(ConnectionManager::new(connector, DB_NAME)),
            ready: AtomicBool::new(false),
            stats: ServiceStats::default(),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Swap the configuration.
    ///
    /// Affects only future updates and cycles; already-bucketed values
    /// keep the key they were quantized with.
    pub fn set_config(&self, config: Config) {
        self.config.store(Arc::new(config));
    }

    /// Counters snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of field values currently pending.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// True once a sink connection has been acquired at least once.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Attempt the first connection.
    ///
    /// The scheduler calls this every cycle until it reports `true`, and
    /// only then starts flushing. Once ready, always returns `true`
    /// without touching the connection.
    pub fn initialize(&self) -> bool {
        if self.is_ready() {
            return true;
        }
        let config = self.config.load_full();
        if self.connection.lock().acquire(&config).is_some() {
            self.ready.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Ingest one update at an explicit timestamp.
    ///
    /// The bucket key uses the interval configured at the moment of
    /// insertion; a later interval change never re-buckets this value.
    pub fn ingest_at(
        &self,
        channel: &str,
        config_channel: bool,
        value: Option<&serde_json::Value>,
        now_ms: u64,
    ) {
        if config_channel {
            self.stats.updates_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(raw) = value else {
            self.stats.updates_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let Some(field_value) = classify(channel, raw) else {
            self.stats.updates_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let interval = self.config.load().cycle_ms;
        self.queue.put(bucket_key(now_ms, interval), field_value);
        self.stats.updates_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Run one flush cycle.
    pub fn flush_once(&self) -> FlushOutcome {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        let config = self.config.load_full();

        let params = config.connect_params();
        let sink = self.connection.lock().acquire(&config);
        let (Some(params), Some(sink)) = (params, sink) else {
            // Clear the queue while no connection exists so a sustained
            // outage cannot fill memory.
            let discarded = self.queue.len();
            self.queue.clear();
            if discarded > 0 {
                self.stats
                    .values_discarded
                    .fetch_add(discarded as u64, Ordering::Relaxed);
                tracing::warn!("no sink connection, discarded {} pending values", discarded);
            }
            return FlushOutcome::NotConnected {
                values_discarded: discarded,
            };
        };
        self.ready.store(true, Ordering::Release);

        let buckets = self.queue.drain_all();
        if buckets.is_empty() {
            return FlushOutcome::Empty;
        }

        let fleet = params.fleet_id.to_string();
        let mut points = Vec::with_capacity(buckets.len());
        for (timestamp, values) in buckets {
            let mut point = DataPoint::new(MEASUREMENT, timestamp).tag(FLEET_TAG, fleet.clone());
            for field_value in values {
                point = point.field(field_value.field, field_value.value);
            }
            points.push(point);
        }

        let count = points.len();
        let values: usize = points.iter().map(|p| p.fields.len()).sum();
        match sink.write(DB_NAME, &points) {
            Ok(()) => {
                tracing::debug!("wrote {} points to InfluxDB", count);
                self.stats
                    .points_written
                    .fetch_add(count as u64, Ordering::Relaxed);
                FlushOutcome::Written { points: count }
            }
            Err(e) => {
                tracing::error!("batch write of {} points failed: {}", count, e);
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .values_discarded
                    .fetch_add(values as u64, Ordering::Relaxed);
                FlushOutcome::WriteFailed { points_lost: count }
            }
        }
    }
}

impl BusListener for PersistenceService {
    fn on_update(&self, channel: &str, config_channel: bool, value: Option<&serde_json::Value>) {
        self.ingest_at(channel, config_channel, value, now_millis());
    }
}

/// Milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
