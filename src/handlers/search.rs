//! Semantic search and single-record retrieval handlers.

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};

use super::router::AppState;
use super::types::{MemoryDetailResponse, SearchRequest, SearchResponse, SearchResultDto};
use crate::errors::{AppError, ValidationErrorExt};
use crate::memory::{AgentIdentity, MemoryId};
use crate::retrieval::SearchParams;
use crate::validation;

pub async fn search(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let date_from = req
        .filters
        .date_from
        .as_deref()
        .map(validation::parse_date)
        .transpose()
        .invalid_field("date_from")?;
    let date_to = req
        .filters
        .date_to
        .as_deref()
        .map(validation::parse_date)
        .transpose()
        .invalid_field("date_to")?;

    let params = SearchParams {
        query: req.query,
        channel: req.filters.channel,
        entity_type: req.filters.entity_type,
        date_from,
        date_to,
        limit: req.limit,
        include_shared: req.include_shared,
    };

    let hits = state.retrieval.search(&agent, params).await?;
    let results: Vec<SearchResultDto> = hits.into_iter().map(Into::into).collect();
    let count = results.len();
    Ok(Json(SearchResponse { results, count }))
}

/// Fetch one stored interaction. Agents can only read their own
/// records.
pub async fn get_memory(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
    Path(memory_id): Path<String>,
) -> Result<Json<MemoryDetailResponse>, AppError> {
    let uuid = validation::validate_memory_id(&memory_id).invalid_field("memory_id")?;
    let interaction = state
        .store
        .get_interaction(&MemoryId(uuid))
        .map_err(|e| AppError::StorageError(e.to_string()))?
        .filter(|i| i.agent_id == agent.agent_id)
        .ok_or(AppError::MemoryNotFound(memory_id))?;
    Ok(Json(interaction.into()))
}
