// src/main.rs
use anyhow::Result;
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use http_health_monitor::{
    config::{self, Config},
    health::HealthMonitor,
    metrics::MetricsRegistry,
    server::{ServerBuilder, StatusHandler},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("http_health_monitor=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config: Config = config::load_config(&config_path).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Initialize metrics
    let metrics_registry = MetricsRegistry::new()?;
    let monitor = Arc::new(
        HealthMonitor::from_config(config.monitor.clone())?
            .with_metrics(metrics_registry.collector()),
    );

    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(
            metrics_addr,
            metrics_registry,
            config.metrics.path.clone(),
            shutdown_rx.clone(),
        )?;
    }

    monitor.start().await?;

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let handler = StatusHandler::new(monitor.clone(), config.server.path.as_str());
    info!(
        "Serving health of {} on {}{}",
        monitor.name(),
        config.server.listen,
        config.server.path
    );

    let served = ServerBuilder::new(config.server.listen)
        .with_handler(handler)
        .serve_until(wait_for_shutdown(shutdown_rx))
        .await;

    monitor.stop().await?;
    info!("Health monitor {} stopped", monitor.name());

    served
}

fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    if req.uri().path() != path.as_str() {
                        return Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(Body::from("Not Found"));
                    }

                    match registry.gather() {
                        Ok(metrics) => Response::builder()
                            .status(StatusCode::OK)
                            .header("Content-Type", "text/plain; version=0.0.4")
                            .body(Body::from(metrics)),
                        Err(e) => {
                            error!("Failed to encode metrics: {}", e);
                            Response::builder()
                                .status(StatusCode::INTERNAL_SERVER_ERROR)
                                .body(Body::empty())
                        }
                    }
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)?
        .serve(make_service)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
