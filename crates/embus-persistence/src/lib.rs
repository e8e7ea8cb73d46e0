// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! EMBus Persistence Service
//!
//! Buffers channel value updates from the EMBus data bus and periodically
//! flushes them to InfluxDB as batched writes.
//!
//! # Architecture
//!
//! ```text
//! bus threads --> BusListener::on_update --> classify --> BucketQueue
//!                                                            |
//! scheduler thread --> flush_once --> ConnectionManager --> TimeSeriesSink
//! ```
//!
//! # Operation
//!
//! 1. The bus invokes `on_update` once per observed channel update, from
//!    arbitrarily many threads. Updates are classified and inserted into
//!    the bucketed queue under the timestamp quantized to the configured
//!    cycle interval. This path is in-memory only and never blocks on
//!    network I/O.
//! 2. A single scheduler thread runs `flush_once` per cycle. Without a
//!    sink connection, the queue is cleared so memory stays bounded
//!    during an outage. With a connection, the queue is drained into one
//!    batch write carrying one data point per bucket.
//! 3. Connection setup is lazy: retried every cycle until it succeeds,
//!    then cached for the process lifetime.
//!
//! # Example
//!
//! ```ignore
//! use embus_persistence::{BusListener, Config, HttpConnector, PersistenceService};
//!
//! let config = Config::builder().endpoint("10.4.0.15").fleet_id(42).build();
//! let service = PersistenceService::new(config, Box::new(HttpConnector));
//!
//! // Wire `&service` into the bus as a BusListener, then per cycle:
//! if service.initialize() {
//!     service.flush_once();
//! }
//! ```

pub mod config;
pub mod connection;
pub mod listener;
pub mod queue;
pub mod service;

pub use config::{Config, ConfigBuilder, ConfigError, ConnectParams};
pub use connection::{ConnectionManager, Connector, HttpConnector, MockConnector, SinkState};
pub use listener::BusListener;
pub use queue::{bucket_key, BucketQueue};
pub use service::{
    FlushOutcome, PersistenceService, StatsSnapshot, DB_NAME, FLEET_TAG, MEASUREMENT,
};

pub use embus_influx::{
    classify, DataPoint, FieldValue, HttpSink, MemorySink, SinkError, TimeSeriesSink, Value,
};
