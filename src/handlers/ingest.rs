//! Ingest handler: one raw interaction in, one memory id out.

use axum::{extract::State, response::Json, Extension};

use super::router::AppState;
use super::types::{IngestRequest, IngestResponse};
use crate::errors::AppError;
use crate::memory::AgentIdentity;
use crate::pipeline::{AttachmentInput, IngestInput};

pub async fn ingest(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentIdentity>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let input = IngestInput {
        text: req.text,
        channel: req.channel,
        metadata: req.metadata,
        attachments: req
            .attachments
            .into_iter()
            .map(|a| AttachmentInput {
                filename: a.filename,
                content: a.content,
            })
            .collect(),
    };

    let outcome = state
        .orchestrator
        .ingest(&agent, input, &state.ingest_settings)
        .await?;

    Ok(Json(IngestResponse {
        memory_id: outcome.memory_id.to_string(),
        summary: outcome.summary,
        entities: outcome.entities,
        shared: outcome.shared,
        degraded: outcome.degraded.iter().map(|s| s.to_string()).collect(),
    }))
}
