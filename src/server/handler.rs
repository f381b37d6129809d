// src/server/handler.rs
use hyper::{header, Body, Method, Request, Response, StatusCode};
use std::sync::Arc;
use tower::Service;

use crate::health::HealthMonitor;

/// Serves the monitor's snapshot as JSON: 200 when healthy, 503 otherwise.
#[derive(Clone)]
pub struct StatusHandler {
    monitor: Arc<HealthMonitor>,
    path: Arc<str>,
}

impl StatusHandler {
    pub fn new(monitor: Arc<HealthMonitor>, path: impl Into<Arc<str>>) -> Self {
        Self {
            monitor,
            path: path.into(),
        }
    }

    async fn handle(
        monitor: Arc<HealthMonitor>,
        path: Arc<str>,
        req: Request<Body>,
    ) -> Result<Response<Body>, hyper::http::Error> {
        if req.uri().path() != &*path {
            return Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from("Not Found"));
        }

        if req.method() != Method::GET {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header(header::ALLOW, "GET")
                .body(Body::empty());
        }

        let snapshot = monitor.snapshot().await;
        let status = if snapshot.verdict.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        let body = match serde_json::to_vec(&snapshot) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(%e, "failed to serialize health snapshot");
                return Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty());
            }
        };

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
    }
}

impl Service<Request<Body>> for StatusHandler {
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let monitor = self.monitor.clone();
        let path = self.path.clone();
        Box::pin(async move {
            Self::handle(monitor, path, req).await.map_err(|e| {
                tracing::error!(%e, "status handler error");
                Box::new(e) as Box<dyn std::error::Error + Send + Sync>
            })
        })
    }
}
