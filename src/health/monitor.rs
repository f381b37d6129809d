// src/health/monitor.rs
use super::{HealthError, HealthProvider, HealthSnapshot, MonitorError, Verdict};
use crate::config::MonitorConfig;
use crate::metrics::MetricsCollector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;

/// Identifier used when a monitor is constructed without a name.
pub const DEFAULT_NAME: &str = "httpServer";

enum Lifecycle {
    Created,
    Running(JoinHandle<()>),
    Stopped,
}

/// Everything readers and the poller share. One lock covers the verdict,
/// its bookkeeping and the lifecycle so transitions are never torn.
struct State {
    verdict: Verdict,
    last_checked: Option<DateTime<Utc>>,
    checks_completed: u64,
    lifecycle: Lifecycle,
}

/// Polls one HTTP endpoint on a fixed interval and keeps the latest verdict.
///
/// `start` returns as soon as the polling task is spawned; the first check
/// runs on that task immediately. `stop` signals the task and waits for it
/// to exit, after which the last verdict stays readable.
pub struct HealthMonitor {
    name: String,
    config: MonitorConfig,
    state: Arc<RwLock<State>>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: watch::Sender<bool>,
}

impl HealthMonitor {
    /// Monitor with the default 60s interval and 5s request timeout.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::build(MonitorConfig::new(name, endpoint))
    }

    pub fn from_config(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(mut config: MonitorConfig) -> Self {
        if config.name.is_empty() {
            config.name = DEFAULT_NAME.to_string();
        }

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            name: config.name.clone(),
            config,
            state: Arc::new(RwLock::new(State {
                verdict: Verdict::Unchecked,
                last_checked: None,
                checks_completed: 0,
                lifecycle: Lifecycle::Created,
            })),
            metrics: None,
            shutdown_tx,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        metrics.update_status(&self.name, &Verdict::Unchecked);
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn interval(&self) -> Duration {
        self.config.interval()
    }

    pub async fn current_verdict(&self) -> Verdict {
        self.state.read().await.verdict.clone()
    }

    pub async fn is_healthy(&self) -> bool {
        self.state.read().await.verdict.is_healthy()
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.read().await;
        HealthSnapshot {
            name: self.name.clone(),
            endpoint: self.config.endpoint.clone(),
            verdict: state.verdict.clone(),
            last_checked: state.last_checked,
            checks_completed: state.checks_completed,
        }
    }

    pub async fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.state.write().await;
        match state.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running(_) => return Err(MonitorError::AlreadyStarted),
            Lifecycle::Stopped => return Err(MonitorError::Stopped),
        }

        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let client = Client::builder()
            .timeout(self.config.timeout())
            .build()
            .map_err(MonitorError::Client)?;

        let poller = Poller {
            name: self.name.clone(),
            endpoint: self.config.endpoint.clone(),
            interval: self.config.interval(),
            timeout: self.config.timeout(),
            client,
            state: self.state.clone(),
            metrics: self.metrics.clone(),
        };

        let handle = runtime.spawn(poller.run(self.shutdown_tx.subscribe()));
        state.lifecycle = Lifecycle::Running(handle);

        info!(
            monitor = %self.name,
            endpoint = %self.config.endpoint,
            "Started health monitor with interval: {:?}",
            self.config.interval()
        );
        Ok(())
    }

    /// Stopping a monitor that never started closes it and reports
    /// `NotStarted`; stopping an already stopped monitor is a no-op.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let handle = {
            let mut state = self.state.write().await;
            match std::mem::replace(&mut state.lifecycle, Lifecycle::Stopped) {
                Lifecycle::Created => {
                    debug!(monitor = %self.name, "Stop requested before start");
                    return Err(MonitorError::NotStarted);
                }
                Lifecycle::Stopped => return Ok(()),
                Lifecycle::Running(handle) => handle,
            }
        };

        let _ = self.shutdown_tx.send(true);

        if let Err(e) = handle.await {
            error!(monitor = %self.name, "Health monitor task failed: {}", e);
        }

        warn!(monitor = %self.name, "Received close signal, health monitor stopped");
        Ok(())
    }

    pub async fn close(&self) -> Result<(), MonitorError> {
        self.stop().await
    }
}

#[async_trait]
impl HealthProvider for HealthMonitor {
    fn name(&self) -> &str {
        HealthMonitor::name(self)
    }

    async fn verdict(&self) -> Verdict {
        self.current_verdict().await
    }

    async fn start(&self) -> Result<(), MonitorError> {
        HealthMonitor::start(self).await
    }

    async fn stop(&self) -> Result<(), MonitorError> {
        HealthMonitor::stop(self).await
    }
}

/// The background half of a monitor; owned by its spawned task.
struct Poller {
    name: String,
    endpoint: String,
    interval: Duration,
    timeout: Duration,
    client: Client,
    state: Arc<RwLock<State>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Poller {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately, so the first check does not
        // wait a full interval. A closed channel means the monitor was dropped.
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }

            tokio::select! {
                _ = self.perform_check() => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        info!(monitor = %self.name, "Health monitor loop exited");
    }

    async fn perform_check(&self) {
        debug!(monitor = %self.name, endpoint = %self.endpoint, "Checking health");
        let started = Instant::now();

        let verdict = match self.probe().await {
            Ok(()) => Verdict::Healthy,
            Err(e) => Verdict::unhealthy(e.to_string()),
        };
        let elapsed = started.elapsed();

        let previous = {
            let mut state = self.state.write().await;
            state.last_checked = Some(Utc::now());
            state.checks_completed += 1;
            std::mem::replace(&mut state.verdict, verdict.clone())
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_check(&self.name, &verdict, elapsed);
        }

        if previous == verdict {
            debug!(monitor = %self.name, "Health unchanged: {}", verdict);
            return;
        }

        match &verdict {
            Verdict::Healthy => info!(
                monitor = %self.name,
                "Endpoint is now healthy (was {})",
                previous
            ),
            Verdict::Unhealthy { reason } => warn!(
                monitor = %self.name,
                "Endpoint is unhealthy: {}",
                reason
            ),
            Verdict::Unchecked => {}
        }
    }

    async fn probe(&self) -> Result<(), HealthError> {
        if self.endpoint.trim().is_empty() {
            return Err(HealthError::Configuration(
                "endpoint is not configured".to_string(),
            ));
        }

        let url = Url::parse(&self.endpoint).map_err(|e| {
            HealthError::Configuration(format!("invalid endpoint {:?}: {}", self.endpoint, e))
        })?;

        let response = match timeout(self.timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(HealthError::Timeout(self.timeout)),
            Ok(Err(e)) => return Err(HealthError::Transport(e)),
            Err(_) => return Err(HealthError::Timeout(self.timeout)),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(HealthError::UnexpectedStatus(status.as_u16()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRegistry;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    fn fast_config(endpoint: &str) -> MonitorConfig {
        MonitorConfig {
            name: "test".to_string(),
            endpoint: endpoint.to_string(),
            interval_ms: 100,
            timeout_ms: 50,
        }
    }

    async fn wait_for(monitor: &HealthMonitor, pred: impl Fn(&Verdict) -> bool) -> Verdict {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let verdict = monitor.current_verdict().await;
            if pred(&verdict) || Instant::now() >= deadline {
                return verdict;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_unchecked_before_start() {
        let monitor = HealthMonitor::new("upstream", "http://127.0.0.1:1/health");
        assert_eq!(monitor.current_verdict().await, Verdict::Unchecked);
        assert!(!monitor.is_healthy().await);

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.checks_completed, 0);
        assert!(snapshot.last_checked.is_none());
    }

    #[test]
    fn test_empty_name_gets_default() {
        let monitor = HealthMonitor::new("", "http://127.0.0.1/");
        assert_eq!(monitor.name(), DEFAULT_NAME);
        assert_eq!(monitor.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_config_rejects_timeout_not_below_interval() {
        let config = MonitorConfig {
            timeout_ms: 100,
            ..fast_config("http://127.0.0.1/")
        };
        assert!(matches!(
            HealthMonitor::from_config(config),
            Err(MonitorError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_first_check_runs_immediately() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        // Default interval is a minute; only the immediate check can land here.
        let monitor = HealthMonitor::new("upstream", format!("{}/health", server.url()));
        monitor.start().await.unwrap();

        let verdict = wait_for(&monitor, |v| !v.is_unchecked()).await;
        assert_eq!(verdict, Verdict::Healthy);
        assert!(monitor.is_healthy().await);

        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_unhealthy() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(500)
            .create_async()
            .await;

        let monitor =
            HealthMonitor::from_config(fast_config(&format!("{}/health", server.url()))).unwrap();
        monitor.start().await.unwrap();

        let verdict = wait_for(&monitor, |v| !v.is_unchecked()).await;
        assert_eq!(verdict, Verdict::unhealthy("unexpected status code 500"));
        assert!(verdict.reason().unwrap().contains("500"));

        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let monitor = HealthMonitor::from_config(fast_config(&format!("http://{}/health", addr)))
            .unwrap();
        monitor.start().await.unwrap();

        let verdict = wait_for(&monitor, |v| !v.is_unchecked()).await;
        let reason = verdict.reason().expect("verdict should be unhealthy");
        assert!(reason.starts_with("transport error"), "reason: {}", reason);

        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let monitor = HealthMonitor::from_config(fast_config(&format!("http://{}/health", addr)))
            .unwrap();
        monitor.start().await.unwrap();

        let verdict = wait_for(&monitor, |v| !v.is_unchecked()).await;
        let reason = verdict.reason().expect("verdict should be unhealthy");
        assert!(reason.contains("timed out"), "reason: {}", reason);

        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_endpoint_is_configuration_error() {
        let monitor = HealthMonitor::new("", "");
        monitor.start().await.unwrap();

        let verdict = wait_for(&monitor, |v| !v.is_unchecked()).await;
        assert_eq!(
            verdict,
            Verdict::unhealthy("configuration error: endpoint is not configured")
        );

        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let monitor = HealthMonitor::from_config(fast_config("")).unwrap();
        monitor.start().await.unwrap();
        assert!(matches!(
            monitor.start().await,
            Err(MonitorError::AlreadyStarted)
        ));

        monitor.stop().await.unwrap();
        assert!(matches!(monitor.start().await, Err(MonitorError::Stopped)));
    }

    #[tokio::test]
    async fn test_stop_is_safe_to_repeat() {
        let never_started = HealthMonitor::new("idle", "http://127.0.0.1/");
        assert!(matches!(
            never_started.stop().await,
            Err(MonitorError::NotStarted)
        ));
        assert!(never_started.close().await.is_ok());
        assert!(matches!(
            never_started.start().await,
            Err(MonitorError::Stopped)
        ));
        assert_eq!(never_started.current_verdict().await, Verdict::Unchecked);

        let monitor = HealthMonitor::from_config(fast_config("")).unwrap();
        monitor.start().await.unwrap();
        assert!(monitor.stop().await.is_ok());
        assert!(monitor.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_no_checks_after_stop() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let monitor =
            HealthMonitor::from_config(fast_config(&format!("{}/health", server.url()))).unwrap();
        monitor.start().await.unwrap();
        wait_for(&monitor, |v| v.is_healthy()).await;
        monitor.stop().await.unwrap();

        let before = monitor.snapshot().await;
        sleep(monitor.interval() * 3).await;
        let after = monitor.snapshot().await;

        assert_eq!(before.checks_completed, after.checks_completed);
        assert_eq!(before.last_checked, after.last_checked);
        assert_eq!(after.verdict, Verdict::Healthy);
    }

    #[tokio::test]
    async fn test_checks_are_recorded_in_metrics() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        let monitor = HealthMonitor::from_config(fast_config(""))
            .unwrap()
            .with_metrics(metrics.clone());
        assert_eq!(metrics.monitor_status.with_label_values(&["test"]).get(), -1);

        monitor.start().await.unwrap();
        wait_for(&monitor, |v| !v.is_unchecked()).await;
        monitor.stop().await.unwrap();

        assert!(
            metrics
                .checks_total
                .with_label_values(&["test", "unhealthy"])
                .get()
                >= 1
        );
        assert_eq!(metrics.monitor_status.with_label_values(&["test"]).get(), 0);
    }

    #[tokio::test]
    async fn test_usable_as_provider() {
        let provider: Box<dyn HealthProvider> =
            Box::new(HealthMonitor::from_config(fast_config("")).unwrap());
        assert_eq!(provider.name(), "test");
        assert_eq!(provider.verdict().await, Verdict::Unchecked);

        provider.start().await.unwrap();
        provider.stop().await.unwrap();
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let monitor = HealthMonitor::new("upstream", "http://127.0.0.1/");
        let result = futures::executor::block_on(monitor.start());
        assert!(matches!(result, Err(MonitorError::NoRuntime)));
    }
}
