// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistence service configuration.
//!
//! Connection parameters are supplied externally (flags, YAML file, or a
//! management layer swapping the config at runtime). A configuration with
//! any required connection value missing is a steady "not ready" state,
//! not an error.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

fn default_credential() -> Option<String> {
    Some("root".to_string())
}

fn default_cycle_ms() -> u64 {
    10_000
}

/// Persistence service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fleet identifier written as the `fleet` tag on every point.
    #[serde(default)]
    pub fleet_id: Option<u32>,

    /// InfluxDB endpoint: bare host (port 8086 assumed) or full http URL.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP basic auth username.
    #[serde(default = "default_credential")]
    pub username: Option<String>,

    /// HTTP basic auth password.
    #[serde(default = "default_credential")]
    pub password: Option<String>,

    /// Flush cycle in milliseconds. The same value is the bucket
    /// quantization width, so each flush typically emits the just-closed
    /// bucket(s).
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fleet_id: None,
            endpoint: None,
            username: default_credential(),
            password: default_credential(),
            cycle_ms: default_cycle_ms(),
        }
    }
}

/// Connection parameters extracted from a complete configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub endpoint: String,
    pub fleet_id: u32,
    pub username: String,
    pub password: String,
}

impl Config {
    /// Create a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Extract the sink connection parameters.
    ///
    /// Returns `None` while any of endpoint, fleet id, username or
    /// password is missing; the connection manager then skips I/O
    /// entirely.
    pub fn connect_params(&self) -> Option<ConnectParams> {
        Some(ConnectParams {
            endpoint: self.endpoint.clone()?,
            fleet_id: self.fleet_id?,
            username: self.username.clone()?,
            password: self.password.clone()?,
        })
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// Configuration parsing errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Config builder for fluent API.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    fleet_id: Option<u32>,
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    cycle_ms: Option<u64>,
}

impl ConfigBuilder {
    /// Set the fleet identifier.
    pub fn fleet_id(mut self, id: u32) -> Self {
        self.fleet_id = Some(id);
        self
    }

    /// Set the InfluxDB endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the username (default "root").
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password (default "root").
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the flush cycle in milliseconds (default 10000).
    pub fn cycle_ms(mut self, cycle_ms: u64) -> Self {
        self.cycle_ms = Some(cycle_ms);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        let defaults = Config::default();

        Config {
            fleet_id: self.fleet_id,
            endpoint: self.endpoint,
            username: self.username.or(defaults.username),
            password: self.password.or(defaults.password),
            cycle_ms: self.cycle_ms.unwrap_or(defaults.cycle_ms),
        }
    }
}
