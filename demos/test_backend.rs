//! demos/test_backend.rs
//! Run: cargo run --example test_backend -- <port> [flip_secs]
//!
//! Serves `/health`, flipping between 200 and 503 every `flip_secs`
//! seconds so a running monitor can be watched changing its verdict.

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;

#[derive(Clone)]
struct BackendState {
    req_counter: Arc<AtomicU64>,
    healthy_flag: Arc<AtomicBool>,
}

async fn handle(
    req: Request<Body>,
    state: BackendState,
) -> Result<Response<Body>, hyper::http::Error> {
    let n = state.req_counter.fetch_add(1, Ordering::SeqCst) + 1;

    if req.uri().path() != "/health" {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not Found"));
    }

    let healthy = state.healthy_flag.load(Ordering::SeqCst);
    println!("probe #{} -> {}", n, if healthy { 200 } else { 503 });

    if healthy {
        Response::builder()
            .status(StatusCode::OK)
            .body(Body::from("OK"))
    } else {
        Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::from("Unhealthy"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "8001".into())
        .parse()?;
    let flip_secs: u64 = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "30".into())
        .parse()?;

    let state = BackendState {
        req_counter: Arc::new(AtomicU64::new(0)),
        healthy_flag: Arc::new(AtomicBool::new(true)),
    };

    {
        let st = state.clone();
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(flip_secs)).await;
                let was_healthy = st.healthy_flag.fetch_xor(true, Ordering::SeqCst);
                println!(
                    "Health flipped -> {}",
                    if was_healthy { "unhealthy" } else { "healthy" }
                );
            }
        });
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let make_svc = make_service_fn(move |_conn| {
        let st = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, st.clone()))) }
    });

    println!(
        "Test backend on http://{}/health  [flips every {}s]",
        addr, flip_secs
    );

    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}
