//! Lesson CRUD handlers.
//!
//! Lessons are created by humans here or by the miner (see the admin
//! handlers); every mutation lands in the audit log.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::Utc;

use super::router::AppState;
use super::types::{
    LessonCreateRequest, LessonDto, LessonListQuery, LessonUpdateRequest, LessonsResponse,
};
use crate::audit::{AuditEntry, AuditOutcome};
use crate::errors::{AppError, ValidationErrorExt};
use crate::memory::{AgentIdentity, Lesson, LessonOrigin, LessonStatus, MemoryId};
use crate::validation;

fn parse_status(raw: &str) -> Result<LessonStatus, AppError> {
    LessonStatus::parse(raw).ok_or_else(|| AppError::InvalidInput {
        field: "status".into(),
        reason: format!("unknown status '{raw}' (expected draft|approved)"),
    })
}

fn audit_mutation(state: &AppState, agent: &AgentIdentity, action: &str, detail: String) {
    let entry = AuditEntry {
        agent_id: agent.agent_id.clone(),
        action: action.to_string(),
        timestamp: Utc::now(),
        outcome: AuditOutcome::Ok,
        detail,
    };
    if let Err(e) = state.audit.append(&entry) {
        tracing::warn!(action, "audit append degraded: {e:#}");
    }
}

/// GET /api/lessons?status=draft|approved
///
/// Without an explicit status filter, unapproved drafts are hidden
/// when the approval-required policy is on.
pub async fn list_lessons(
    State(state): State<AppState>,
    Query(query): Query<LessonListQuery>,
) -> Result<Json<LessonsResponse>, AppError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;

    let effective = match status {
        Some(s) => Some(s),
        None if state.config.mining.approval_required => Some(LessonStatus::Approved),
        None => None,
    };

    let lessons = state
        .store
        .list_lessons(effective)
        .map_err(|e| AppError::StorageError(e.to_string()))?;
    let lessons: Vec<LessonDto> = lessons.into_iter().map(Into::into).collect();
    let count = lessons.len();
    Ok(Json(LessonsResponse { lessons, count }))
}

/// POST /api/lessons
pub async fn create_lesson(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
    Json(req): Json<LessonCreateRequest>,
) -> Result<Json<LessonDto>, AppError> {
    validation::validate_entity_token(&req.name).invalid_field("name")?;
    validation::validate_entity_token(&req.lesson_type).invalid_field("type")?;
    if req.body.trim().is_empty() || req.body.len() > validation::MAX_LESSON_BODY_LENGTH {
        return Err(AppError::InvalidInput {
            field: "body".into(),
            reason: format!(
                "body must be non-empty and at most {} bytes",
                validation::MAX_LESSON_BODY_LENGTH
            ),
        });
    }
    let status = match req.status.as_deref() {
        Some(raw) => parse_status(raw)?,
        None => LessonStatus::Draft,
    };

    let now = Utc::now();
    let lesson = Lesson {
        id: MemoryId::new(),
        name: req.name.trim().to_string(),
        lesson_type: req.lesson_type.trim().to_string(),
        body: req.body,
        status,
        origin: LessonOrigin::Human,
        created_at: now,
        updated_at: now,
    };
    state
        .store
        .put_lesson(&lesson)
        .map_err(|e| AppError::StorageError(e.to_string()))?;

    audit_mutation(&state, &agent, "lesson_create", lesson.id.to_string());
    Ok(Json(lesson.into()))
}

/// PUT /api/lessons/{id}
///
/// Content edits leave status alone; status changes are explicit. The
/// common path is draft -> approved, but an edit may revert content
/// without touching status.
pub async fn update_lesson(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
    Path(id): Path<String>,
    Json(req): Json<LessonUpdateRequest>,
) -> Result<Json<LessonDto>, AppError> {
    let uuid = validation::validate_memory_id(&id).invalid_field("id")?;
    let mut lesson = state
        .store
        .get_lesson(&MemoryId(uuid))
        .map_err(|e| AppError::StorageError(e.to_string()))?
        .ok_or_else(|| AppError::LessonNotFound(id.clone()))?;

    if let Some(name) = req.name {
        validation::validate_entity_token(&name).invalid_field("name")?;
        lesson.name = name.trim().to_string();
    }
    if let Some(lesson_type) = req.lesson_type {
        validation::validate_entity_token(&lesson_type).invalid_field("type")?;
        lesson.lesson_type = lesson_type.trim().to_string();
    }
    if let Some(body) = req.body {
        if body.trim().is_empty() || body.len() > validation::MAX_LESSON_BODY_LENGTH {
            return Err(AppError::InvalidInput {
                field: "body".into(),
                reason: "body must be non-empty and within the size limit".into(),
            });
        }
        lesson.body = body;
    }
    if let Some(raw) = req.status {
        lesson.status = parse_status(&raw)?;
    }
    lesson.updated_at = Utc::now();

    state
        .store
        .put_lesson(&lesson)
        .map_err(|e| AppError::StorageError(e.to_string()))?;

    audit_mutation(&state, &agent, "lesson_update", lesson.id.to_string());
    Ok(Json(lesson.into()))
}

/// DELETE /api/lessons/{id}
pub async fn delete_lesson(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let uuid = validation::validate_memory_id(&id).invalid_field("id")?;
    let memory_id = MemoryId(uuid);
    if state
        .store
        .get_lesson(&memory_id)
        .map_err(|e| AppError::StorageError(e.to_string()))?
        .is_none()
    {
        return Err(AppError::LessonNotFound(id));
    }
    state
        .store
        .delete_lesson(&memory_id)
        .map_err(|e| AppError::StorageError(e.to_string()))?;

    audit_mutation(&state, &agent, "lesson_delete", memory_id.to_string());
    Ok(Json(serde_json::json!({ "deleted": true })))
}
