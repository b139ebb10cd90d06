//! Entity timeline and daily log handlers.

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};

use super::router::AppState;
use super::types::{DailyLogResponse, MemorySummaryDto, TimelineResponse};
use crate::errors::{AppError, ValidationErrorExt};
use crate::memory::AgentIdentity;
use crate::validation;

/// GET /api/timeline/{entity_type}/{entity_name}
///
/// Every interaction of the calling agent that references the entity,
/// timestamp ascending.
pub async fn timeline(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
    Path((entity_type, entity_name)): Path<(String, String)>,
) -> Result<Json<TimelineResponse>, AppError> {
    let interactions = state.retrieval.timeline(&agent, &entity_type, &entity_name)?;
    let memories: Vec<MemorySummaryDto> = interactions.iter().map(Into::into).collect();
    let count = memories.len();
    Ok(Json(TimelineResponse {
        entity_type,
        entity_name,
        memories,
        count,
    }))
}

/// GET /api/daily_log/{date}
///
/// Every interaction of the calling agent on the given calendar date
/// (in the configured timezone), timestamp ascending.
pub async fn daily_log(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
    Path(date): Path<String>,
) -> Result<Json<DailyLogResponse>, AppError> {
    let parsed = validation::parse_date(&date).invalid_field("date")?;
    let interactions = state.retrieval.daily_log(&agent, parsed)?;
    let memories: Vec<MemorySummaryDto> = interactions.iter().map(Into::into).collect();
    let count = memories.len();
    Ok(Json(DailyLogResponse {
        date,
        memories,
        count,
    }))
}
