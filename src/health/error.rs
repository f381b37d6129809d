// src/health/error.rs
use std::time::Duration;

/// Why a single check cycle failed. Recorded as the verdict, never returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Lifecycle misuse or failure to launch the polling task.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("health monitor is already started")]
    AlreadyStarted,

    #[error("health monitor was never started")]
    NotStarted,

    #[error("health monitor is stopped and cannot be restarted")]
    Stopped,

    #[error("no Tokio runtime available to spawn the polling task")]
    NoRuntime,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid monitor configuration: {0}")]
    Configuration(String),
}
