//! Operational endpoints: manual mining triggers, durability sync,
//! and per-agent audit history.

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};

use super::router::AppState;
use super::types::{AuditResponse, SyncResponse};
use crate::errors::{AppError, ValidationErrorExt};
use crate::lessons::MiningOutcome;
use crate::memory::AgentIdentity;
use crate::validation;

const AUDIT_PAGE_SIZE: usize = 200;

/// POST /api/admin/mine_lessons
///
/// Runs one mining pass inline and reports how many draft lessons it
/// produced. Overlapping triggers are rejected with 409.
pub async fn mine_lessons(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
) -> Result<Json<MiningOutcome>, AppError> {
    let outcome = state.miner.mine(&agent.agent_id).await?;
    Ok(Json(outcome))
}

/// POST /api/admin/sync
///
/// Flushes all durable stores to disk.
pub async fn sync(State(state): State<AppState>) -> Result<Json<SyncResponse>, AppError> {
    state
        .flush()
        .map_err(|e| AppError::StorageError(e.to_string()))?;
    Ok(Json(SyncResponse { status: "synced" }))
}

/// GET /api/audit/{agent_id}
///
/// Most recent audit entries for one agent, newest first.
pub async fn audit_trail(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AuditResponse>, AppError> {
    validation::validate_agent_id(&agent_id).invalid_field("agent_id")?;
    let entries = state
        .audit
        .recent(&agent_id, AUDIT_PAGE_SIZE)
        .map_err(|e| AppError::StorageError(e.to_string()))?;
    let count = entries.len();
    Ok(Json(AuditResponse { entries, count }))
}
