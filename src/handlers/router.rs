//! Route tables. Public routes (health, metrics) skip auth; everything
//! under /api requires an agent key.

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use super::state::ServiceState;
use super::{admin, health, ingest, lessons, search, timeline};

pub type AppState = Arc<ServiceState>;

pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics_endpoint))
        .with_state(state)
}

pub fn build_protected_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/ingest", post(ingest::ingest))
        .route("/api/search", post(search::search))
        .route("/api/memory/{memory_id}", get(search::get_memory))
        .route(
            "/api/timeline/{entity_type}/{entity_name}",
            get(timeline::timeline),
        )
        .route("/api/daily_log/{date}", get(timeline::daily_log))
        .route(
            "/api/lessons",
            get(lessons::list_lessons).post(lessons::create_lesson),
        )
        .route(
            "/api/lessons/{id}",
            put(lessons::update_lesson).delete(lessons::delete_lesson),
        )
        .route("/api/admin/mine_lessons", post(admin::mine_lessons))
        .route("/api/admin/sync", post(admin::sync))
        .route("/api/audit/{agent_id}", get(admin::audit_trail))
        .with_state(state)
}
