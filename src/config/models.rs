// src/config/models.rs
use crate::health::MonitorError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.monitor.endpoint.trim().is_empty() {
            bail!("monitor.endpoint must be set");
        }
        self.monitor.validate()?;

        if !self.server.path.starts_with('/') {
            bail!("server.path must start with '/': {}", self.server.path);
        }

        if self.metrics.enabled {
            if !self.metrics.path.starts_with('/') {
                bail!("metrics.path must start with '/': {}", self.metrics.path);
            }
            if self.metrics.port == self.server.listen.port() {
                bail!(
                    "metrics.port {} collides with server.listen {}",
                    self.metrics.port,
                    self.server.listen
                );
            }
        }

        Ok(())
    }
}

/// Settings for a single [`HealthMonitor`](crate::health::HealthMonitor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Empty means the default identifier.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl MonitorConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The endpoint is deliberately not checked here; an empty endpoint
    /// surfaces as an unhealthy verdict at check time.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.interval_ms == 0 {
            return Err(MonitorError::Configuration(
                "interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(MonitorError::Configuration(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.timeout_ms >= self.interval_ms {
            return Err(MonitorError::Configuration(format!(
                "timeout_ms ({}) must be shorter than interval_ms ({})",
                self.timeout_ms, self.interval_ms
            )));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            endpoint: String::new(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Status endpoint exposing the current verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_status_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_status_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_status_path() -> String {
    "/health".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
