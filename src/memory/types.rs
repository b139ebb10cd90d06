//! Type definitions for the memory system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)] // Serialize as plain UUID string, not array
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-agent access level, decided at credential provisioning time.
///
/// `Private` agents never have their data scrubbed-and-shared, no
/// matter what the global sharing policy says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Private,
    Shared,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Private => "private",
            AccessLevel::Shared => "shared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "private" => Some(AccessLevel::Private),
            "shared" => Some(AccessLevel::Shared),
            _ => None,
        }
    }
}

/// Authenticated caller identity, attached to the request by the auth
/// middleware and threaded into every handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub access: AccessLevel,
}

/// Parse outcome for an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    Parsed,
    Failed,
}

/// A parsed attachment belonging to one interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub byte_size: usize,
    /// Extracted plain text; empty when parsing failed.
    pub text: String,
    pub status: ParseStatus,
}

/// A typed, named entity mention attached to an interaction.
///
/// The type is drawn from the administrator-defined catalog, so it is
/// an open string rather than an enum. Identity of a logical entity is
/// (type, name) string equality; there is no canonical entity row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub name: String,
    /// Free-text role, e.g. "primary" or "mentioned".
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub confidence: f32,
}

fn default_role() -> String {
    "mentioned".to_string()
}

/// One raw ingested record from an agent, plus the derived fields the
/// ingest pipeline attaches in the same pass. The raw fields (text,
/// channel, metadata, documents, timestamp) are never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: MemoryId,
    pub agent_id: String,
    /// Free-form channel tag: "email", "call", "meeting", ...
    pub channel: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub documents: Vec<Document>,

    // Derived fields, written by the ingest pipeline.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// True once a scrubbed derivative exists in the shared partition.
    #[serde(default)]
    pub shared: bool,
}

/// PII-scrubbed derivative of an interaction, stored in the shared
/// partition. Never contains the source's raw text verbatim; lifecycle
/// is decoupled from the source record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedRecord {
    pub id: MemoryId,
    pub source_id: MemoryId,
    pub agent_id: String,
    pub channel: String,
    pub scrubbed_text: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Lesson lifecycle status. The common path is one-directional:
/// draft -> approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    Draft,
    Approved,
}

impl LessonStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Some(LessonStatus::Draft),
            "approved" => Some(LessonStatus::Approved),
            _ => None,
        }
    }
}

/// Who created a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonOrigin {
    Human,
    Miner,
}

/// A distilled, reusable knowledge unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: MemoryId,
    pub name: String,
    /// Open taxonomy, like entity types.
    pub lesson_type: String,
    pub body: String,
    pub status: LessonStatus,
    pub origin: LessonOrigin,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_level_parse_roundtrip() {
        assert_eq!(AccessLevel::parse("shared"), Some(AccessLevel::Shared));
        assert_eq!(AccessLevel::parse(" Private "), Some(AccessLevel::Private));
        assert_eq!(AccessLevel::parse("root"), None);
    }

    #[test]
    fn memory_id_serializes_as_plain_string() {
        let id = MemoryId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"') && json.ends_with('"'));
    }
}
