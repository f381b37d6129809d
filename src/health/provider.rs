// src/health/provider.rs
use super::{MonitorError, Verdict};
use async_trait::async_trait;

/// Contract consumed by whatever aggregates health across components.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn verdict(&self) -> Verdict;

    async fn start(&self) -> Result<(), MonitorError>;

    async fn stop(&self) -> Result<(), MonitorError>;
}
