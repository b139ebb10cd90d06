//! Request/response DTOs for the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::audit::AuditEntry;
use crate::memory::{EntityRef, Interaction, Lesson, ParseStatus};
use crate::retrieval::{HitSource, SearchHit};

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AttachmentDto {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    pub channel: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDto>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub memory_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub entities: Vec<EntityRef>,
    pub shared: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SearchFiltersDto {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    /// YYYY-MM-DD, inclusive.
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFiltersDto,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_shared: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResultDto {
    pub memory_id: String,
    pub score: f32,
    pub source: HitSource,
    pub agent_id: String,
    pub channel: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl From<SearchHit> for SearchResultDto {
    fn from(hit: SearchHit) -> Self {
        Self {
            memory_id: hit.memory_id.to_string(),
            score: hit.score,
            source: hit.source,
            agent_id: hit.agent_id,
            channel: hit.channel,
            summary: hit.summary,
            timestamp: hit.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultDto>,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Timeline / daily log / memory detail
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct MemorySummaryDto {
    pub memory_id: String,
    pub channel: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
    pub entities: Vec<EntityRef>,
}

impl From<&Interaction> for MemorySummaryDto {
    fn from(i: &Interaction) -> Self {
        let summary = i.summary.clone().unwrap_or_else(|| {
            let mut text = i.text.clone();
            if text.len() > 160 {
                let mut end = 160;
                while end > 0 && !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
                text.push('…');
            }
            text
        });
        Self {
            memory_id: i.id.to_string(),
            channel: i.channel.clone(),
            summary,
            timestamp: i.timestamp,
            entities: i.entities.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub entity_type: String,
    pub entity_name: String,
    pub memories: Vec<MemorySummaryDto>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DailyLogResponse {
    pub date: String,
    pub memories: Vec<MemorySummaryDto>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DocumentDto {
    pub filename: String,
    pub byte_size: usize,
    pub status: ParseStatus,
}

/// Full record view, minus the embedding vector (large and useless to
/// API clients).
#[derive(Debug, Serialize)]
pub struct MemoryDetailResponse {
    pub memory_id: String,
    pub agent_id: String,
    pub channel: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub entities: Vec<EntityRef>,
    pub documents: Vec<DocumentDto>,
    pub shared: bool,
}

impl From<Interaction> for MemoryDetailResponse {
    fn from(i: Interaction) -> Self {
        Self {
            memory_id: i.id.to_string(),
            agent_id: i.agent_id,
            channel: i.channel,
            text: i.text,
            metadata: i.metadata,
            timestamp: i.timestamp,
            summary: i.summary,
            entities: i.entities,
            documents: i
                .documents
                .into_iter()
                .map(|d| DocumentDto {
                    filename: d.filename,
                    byte_size: d.byte_size,
                    status: d.status,
                })
                .collect(),
            shared: i.shared,
        }
    }
}

// ---------------------------------------------------------------------------
// Lessons
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LessonCreateRequest {
    pub name: String,
    #[serde(alias = "type")]
    pub lesson_type: String,
    pub body: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LessonUpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "type")]
    pub lesson_type: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LessonListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LessonDto {
    pub id: String,
    pub name: String,
    pub lesson_type: String,
    pub body: String,
    pub status: String,
    pub origin: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Lesson> for LessonDto {
    fn from(l: Lesson) -> Self {
        Self {
            id: l.id.to_string(),
            name: l.name,
            lesson_type: l.lesson_type,
            body: l.body,
            status: match l.status {
                crate::memory::LessonStatus::Draft => "draft".to_string(),
                crate::memory::LessonStatus::Approved => "approved".to_string(),
            },
            origin: match l.origin {
                crate::memory::LessonOrigin::Human => "human".to_string(),
                crate::memory::LessonOrigin::Miner => "miner".to_string(),
            },
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LessonsResponse {
    pub lessons: Vec<LessonDto>,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub entries: Vec<AuditEntry>,
    pub count: usize,
}
