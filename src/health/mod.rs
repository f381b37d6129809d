// src/health/mod.rs
mod error;
mod monitor;
mod provider;
mod status;

pub use error::{HealthError, MonitorError};
pub use monitor::{HealthMonitor, DEFAULT_NAME};
pub use provider::HealthProvider;
pub use status::{HealthSnapshot, Verdict};
