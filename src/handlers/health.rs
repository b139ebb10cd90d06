//! Liveness and metrics endpoints. Both are unauthenticated.

use axum::{extract::State, response::Json};
use serde::Serialize;

use super::router::AppState;
use crate::metrics::gather_metrics;
use crate::vector_index::{Collection, VectorStore};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub private_vectors: usize,
    pub shared_vectors: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        private_vectors: state.vectors.len(Collection::Private),
        shared_vectors: state.vectors.len(Collection::Shared),
    })
}

pub async fn metrics_endpoint() -> String {
    gather_metrics()
}
