// src/metrics/collector.rs
use crate::health::Verdict;
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Render every registered metric in the text exposition format.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    pub checks_total: IntCounterVec,
    pub check_duration_seconds: HistogramVec,
    pub monitor_status: IntGaugeVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let checks_total = IntCounterVec::new(
            Opts::new("health_checks_total", "Total number of completed health checks"),
            &["monitor", "outcome"],
        )?;
        registry.register(Box::new(checks_total.clone()))?;

        let check_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "health_check_duration_seconds",
                "Health check duration in seconds",
            ),
            &["monitor"],
        )?;
        registry.register(Box::new(check_duration_seconds.clone()))?;

        let monitor_status = IntGaugeVec::new(
            Opts::new(
                "health_monitor_status",
                "Current verdict (1=healthy, 0=unhealthy, -1=unchecked)",
            ),
            &["monitor"],
        )?;
        registry.register(Box::new(monitor_status.clone()))?;

        Ok(Self {
            checks_total,
            check_duration_seconds,
            monitor_status,
        })
    }

    pub fn record_check(&self, monitor: &str, verdict: &Verdict, duration: Duration) {
        let outcome = if verdict.is_healthy() {
            "healthy"
        } else {
            "unhealthy"
        };
        self.checks_total
            .with_label_values(&[monitor, outcome])
            .inc();

        self.check_duration_seconds
            .with_label_values(&[monitor])
            .observe(duration.as_secs_f64());

        self.update_status(monitor, verdict);
    }

    pub fn update_status(&self, monitor: &str, verdict: &Verdict) {
        self.monitor_status
            .with_label_values(&[monitor])
            .set(verdict.as_gauge());
    }
}
