//! HTTP endpoint: Prometheus exposition and a liveness probe.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Latest finalized window in Prometheus text format |
//! | GET | `/healthz` | Liveness probe, always `ok` |

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;

use edgescale_metrics::{RateAggregator, render_prometheus};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub aggregator: Arc<RateAggregator>,
}

pub fn build_router(aggregator: Arc<RateAggregator>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
        .with_state(HttpState { aggregator })
}

/// GET /metrics — Prometheus exposition format.
pub async fn prometheus_metrics(State(state): State<HttpState>) -> impl IntoResponse {
    let window = state.aggregator.latest().await;
    let body = render_prometheus(window.as_deref());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

pub async fn healthz() -> &'static str {
    "ok"
}
