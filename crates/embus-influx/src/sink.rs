// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sink abstraction and InfluxDB v1 HTTP client.
//!
//! The flush cycle writes through the `TimeSeriesSink` trait so that the
//! datastore stays an opaque collaborator. `HttpSink` speaks the InfluxDB
//! v1 HTTP API with basic auth; `MemorySink` records batches in memory for
//! tests and dry runs.

use crate::line::{render_batch, DataPoint};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Errors from sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The HTTP request itself failed (connect, DNS, timeout).
    #[error("sink request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The sink answered with a non-success status.
    #[error("sink rejected request: status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Write interface to the time-series datastore.
///
/// Implementations must tolerate repeated `ensure_database` calls for the
/// same name (idempotent create-if-absent).
pub trait TimeSeriesSink: Send + Sync {
    /// Create the target database if it does not exist.
    fn ensure_database(&self, name: &str) -> Result<(), SinkError>;

    /// Write a batch of points in a single request.
    ///
    /// An empty batch is a no-op.
    fn write(&self, database: &str, points: &[DataPoint]) -> Result<(), SinkError>;
}

/// Blocking HTTP client for the InfluxDB v1 API.
pub struct HttpSink {
    client: reqwest::blocking::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpSink {
    /// Build a client for an InfluxDB endpoint.
    ///
    /// `endpoint` may be a bare host (port 8086 assumed) or a full
    /// `http://` / `https://` URL. Construction does not touch the
    /// network; the first request does.
    pub fn connect(endpoint: &str, username: &str, password: &str) -> Result<Self, SinkError> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: normalize_endpoint(endpoint),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn check_status(resp: reqwest::blocking::Response) -> Result<(), SinkError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl TimeSeriesSink for HttpSink {
    fn ensure_database(&self, name: &str) -> Result<(), SinkError> {
        let url = format!("{}/query", self.base_url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .form(&[("q", format!("CREATE DATABASE \"{}\"", name))])
            .send()?;
        Self::check_status(resp)
    }

    fn write(&self, database: &str, points: &[DataPoint]) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }
        let url = format!("{}/write", self.base_url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("db", database), ("precision", "ms")])
            .body(render_batch(points))
            .send()?;
        Self::check_status(resp)?;
        tracing::trace!("wrote {} lines to {}", points.len(), database);
        Ok(())
    }
}

/// Turn a configured endpoint into a base URL.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("http://{}:8086", endpoint)
    }
}

/// In-memory sink for tests and dry runs.
///
/// Records every batch and every `ensure_database` call. Writes can be
/// made to fail to exercise error paths.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<DataPoint>>>,
    databases: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches written so far, in write order.
    pub fn batches(&self) -> Vec<Vec<DataPoint>> {
        self.batches.lock().unwrap().clone()
    }

    /// Number of write calls issued (empty batches excluded).
    pub fn write_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// Database names passed to `ensure_database`, in call order.
    pub fn databases(&self) -> Vec<String> {
        self.databases.lock().unwrap().clone()
    }

    /// Make subsequent writes fail with a rejected status.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl TimeSeriesSink for MemorySink {
    fn ensure_database(&self, name: &str) -> Result<(), SinkError> {
        self.databases.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn write(&self, _database: &str, points: &[DataPoint]) -> Result<(), SinkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected {
                status: 503,
                body: "injected write failure".to_string(),
            });
        }
        if points.is_empty() {
            return Ok(());
        }
        self.batches.lock().unwrap().push(points.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_normalize_endpoint_bare_host() {
        assert_eq!(normalize_endpoint("10.4.0.15"), "http://10.4.0.15:8086");
        assert_eq!(
            normalize_endpoint("influx.example.com"),
            "http://influx.example.com:8086"
        );
    }

    #[test]
    fn test_normalize_endpoint_full_url() {
        assert_eq!(
            normalize_endpoint("http://localhost:9999"),
            "http://localhost:9999"
        );
        assert_eq!(
            normalize_endpoint("https://influx.example.com/"),
            "https://influx.example.com"
        );
    }

    #[test]
    fn test_memory_sink_records_batches() {
        let sink = MemorySink::new();
        let batch = vec![DataPoint::new("data", 0).field("power", Value::Integer(1))];

        sink.write("db", &batch).expect("write");
        assert_eq!(sink.write_count(), 1);
        assert_eq!(sink.batches()[0], batch);
    }

    #[test]
    fn test_memory_sink_ignores_empty_batch() {
        let sink = MemorySink::new();
        sink.write("db", &[]).expect("write");
        assert_eq!(sink.write_count(), 0);
    }

    #[test]
    fn test_memory_sink_records_databases() {
        let sink = MemorySink::new();
        sink.ensure_database("db").expect("ensure");
        sink.ensure_database("db").expect("ensure again");
        assert_eq!(sink.databases(), vec!["db", "db"]);
    }

    #[test]
    fn test_memory_sink_failure_injection() {
        let sink = MemorySink::new();
        sink.set_fail_writes(true);

        let batch = vec![DataPoint::new("data", 0).field("power", Value::Integer(1))];
        let err = sink.write("db", &batch).expect_err("should fail");
        match err {
            SinkError::Rejected { status, .. } => assert_eq!(status, 503),
            other => panic!("expected Rejected, got {:?}", other),
        }
        assert_eq!(sink.write_count(), 0);

        sink.set_fail_writes(false);
        sink.write("db", &batch).expect("write after recovery");
        assert_eq!(sink.write_count(), 1);
    }

    #[test]
    fn test_http_sink_connect_does_no_io() {
        let sink = HttpSink::connect("127.0.0.1", "root", "root").expect("connect");
        assert_eq!(sink.base_url, "http://127.0.0.1:8086");
    }
}
