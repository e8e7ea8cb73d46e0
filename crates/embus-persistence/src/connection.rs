// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lazy sink connection management.
//!
//! # State machine
//!
//! ```text
//! Unconfigured --(config complete)--> Disconnected --(connect ok)--> Connected
//!       ^                                 |    ^                        |
//!       +---(config incomplete)-----------+    +---(connect failed)-----+
//! ```
//!
//! `Connected` is terminal for the process lifetime: the handle is cached
//! and never health-checked or invalidated by a later write failure.
//! `Disconnected` is retried unconditionally on every cycle. A config
//! that turns incomplete stops handles from being handed out but does not
//! discard the cached connection.

use crate::config::{Config, ConnectParams};
use embus_influx::{HttpSink, MemorySink, SinkError, TimeSeriesSink};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Opens sink clients. Seam between the connection manager and the
/// concrete HTTP client, mockable in tests.
pub trait Connector: Send + Sync {
    /// Open a client against the configured endpoint.
    ///
    /// Called only while no connection is cached.
    fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn TimeSeriesSink>, SinkError>;
}

/// Production connector building blocking HTTP clients.
#[derive(Debug, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn TimeSeriesSink>, SinkError> {
        let sink = HttpSink::connect(&params.endpoint, &params.username, &params.password)?;
        Ok(Arc::new(sink))
    }
}

/// Connection state.
#[derive(Clone)]
pub enum SinkState {
    /// Required configuration is missing; no I/O is attempted.
    Unconfigured,
    /// Configured but not yet connected; retried every cycle.
    Disconnected,
    /// Cached for the process lifetime.
    Connected(Arc<dyn TimeSeriesSink>),
}

impl SinkState {
    /// True in the `Connected` state.
    pub fn is_connected(&self) -> bool {
        matches!(self, SinkState::Connected(_))
    }
}

impl std::fmt::Debug for SinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkState::Unconfigured => write!(f, "Unconfigured"),
            SinkState::Disconnected => write!(f, "Disconnected"),
            SinkState::Connected(_) => write!(f, "Connected"),
        }
    }
}

/// Lazily establishes and caches the sink connection.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    database: String,
    state: SinkState,
}

impl ConnectionManager {
    /// Create a manager that will ensure `database` exists at connect
    /// time.
    pub fn new(connector: Box<dyn Connector>, database: impl Into<String>) -> Self {
        Self {
            connector,
            database: database.into(),
            state: SinkState::Unconfigured,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> &SinkState {
        &self.state
    }

    /// Return the cached sink, or attempt to establish one.
    ///
    /// Never fails: an incomplete configuration skips I/O silently, and a
    /// connection or create-database failure is logged and reported as
    /// `None` so the caller degrades instead of crashing.
    pub fn acquire(&mut self, config: &Config) -> Option<Arc<dyn TimeSeriesSink>> {
        let params = match config.connect_params() {
            Some(params) => params,
            None => {
                if !self.state.is_connected() {
                    self.state = SinkState::Unconfigured;
                }
                return None;
            }
        };

        if let SinkState::Connected(sink) = &self.state {
            return Some(Arc::clone(sink));
        }

        match self.try_connect(&params) {
            Ok(sink) => {
                tracing::info!(
                    "connected to InfluxDB at {} (database '{}')",
                    params.endpoint,
                    self.database
                );
                self.state = SinkState::Connected(Arc::clone(&sink));
                Some(sink)
            }
            Err(e) => {
                tracing::error!("unable to connect to InfluxDB at {}: {}", params.endpoint, e);
                self.state = SinkState::Disconnected;
                None
            }
        }
    }

    fn try_connect(&self, params: &ConnectParams) -> Result<Arc<dyn TimeSeriesSink>, SinkError> {
        let sink = self.connector.connect(params)?;
        sink.ensure_database(&self.database)?;
        Ok(sink)
    }
}

/// Scripted connector for tests: fails a configured number of attempts
/// before handing out a shared in-memory sink.
///
/// Clones share all state, so tests can keep a probe after boxing one
/// clone into the service.
#[derive(Clone)]
pub struct MockConnector {
    sink: Arc<MemorySink>,
    remaining_failures: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
}

impl MockConnector {
    /// A connector that always succeeds.
    pub fn new() -> Self {
        Self::failing(0)
    }

    /// A connector whose first `failures` connect attempts fail.
    pub fn failing(failures: u32) -> Self {
        Self {
            sink: Arc::new(MemorySink::new()),
            remaining_failures: Arc::new(AtomicU32::new(failures)),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The sink handed out on successful connects.
    pub fn sink(&self) -> Arc<MemorySink> {
        Arc::clone(&self.sink)
    }

    /// Total connect attempts observed.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MockConnector {
    fn connect(&self, _params: &ConnectParams) -> Result<Arc<dyn TimeSeriesSink>, SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SinkError::Rejected {
                status: 503,
                body: "injected connect failure".to_string(),
            });
        }
        Ok(Arc::clone(&self.sink) as Arc<dyn TimeSeriesSink>)
    }
}
