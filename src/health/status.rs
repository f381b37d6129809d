// src/health/status.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Outcome of the most recent completed health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// No check has completed yet.
    Unchecked,
    Healthy,
    Unhealthy { reason: String },
}

impl Verdict {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Verdict::Unhealthy {
            reason: reason.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }

    pub fn is_unchecked(&self) -> bool {
        matches!(self, Verdict::Unchecked)
    }

    /// Failure reason, if the verdict is unhealthy.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Unhealthy { reason } => Some(reason),
            _ => None,
        }
    }

    /// Gauge encoding: 1 healthy, 0 unhealthy, -1 unchecked.
    pub fn as_gauge(&self) -> i64 {
        match self {
            Verdict::Healthy => 1,
            Verdict::Unhealthy { .. } => 0,
            Verdict::Unchecked => -1,
        }
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Verdict::Unchecked
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Unchecked => write!(f, "unchecked"),
            Verdict::Healthy => write!(f, "healthy"),
            Verdict::Unhealthy { reason } => write!(f, "unhealthy: {}", reason),
        }
    }
}

/// Point-in-time view of a monitor, read under a single lock.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub name: String,
    pub endpoint: String,
    pub verdict: Verdict,
    pub last_checked: Option<DateTime<Utc>>,
    pub checks_completed: u64,
}
