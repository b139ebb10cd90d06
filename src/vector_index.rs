//! Vector store adapter.
//!
//! Narrow upsert/query interface over per-purpose collections. The
//! private and shared partitions are distinct collections and are
//! never queried together unless the caller holds rights to both; the
//! retrieval service enforces that by issuing one query per
//! collection.
//!
//! The default implementation is an in-process flat index rebuilt from
//! the durable stores at startup (vectors ride along on the stored
//! rows), which keeps the adapter contract identical to a remote
//! vector database without adding an index format of its own.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::memory::MemoryId;

/// Logical collection per embedding purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Private,
    Shared,
}

/// Metadata carried with each vector, the only fields filters see.
#[derive(Debug, Clone)]
pub struct VectorMeta {
    pub agent_id: String,
    pub channel: String,
    pub entity_types: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Filter predicate: equality on channel and entity type, plus a
/// timestamp range. Private-collection queries additionally pin the
/// owning agent.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub agent_id: Option<String>,
    pub channel: Option<String>,
    pub entity_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl QueryFilter {
    fn matches(&self, meta: &VectorMeta) -> bool {
        if let Some(agent) = &self.agent_id {
            if &meta.agent_id != agent {
                return false;
            }
        }
        if let Some(channel) = &self.channel {
            if !meta.channel.eq_ignore_ascii_case(channel) {
                return false;
            }
        }
        if let Some(entity_type) = &self.entity_type {
            if !meta
                .entity_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(entity_type))
            {
                return false;
            }
        }
        if let Some(from) = self.from {
            if meta.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if meta.timestamp >= to {
                return false;
            }
        }
        true
    }
}

/// One ranked query hit.
#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub id: MemoryId,
    /// Similarity in [0, 1].
    pub score: f32,
    pub meta: VectorMeta,
}

/// The adapter contract the pipeline and retrieval service consume.
pub trait VectorStore: Send + Sync {
    fn upsert(&self, collection: Collection, id: MemoryId, vector: Vec<f32>, meta: VectorMeta);
    fn query(
        &self,
        collection: Collection,
        vector: &[f32],
        filter: &QueryFilter,
        top_k: usize,
    ) -> Vec<ScoredHit>;
    fn len(&self, collection: Collection) -> usize;
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

struct Entry {
    vector: Vec<f32>,
    meta: VectorMeta,
}

/// In-process flat index.
pub struct LocalVectorIndex {
    private: RwLock<HashMap<MemoryId, Entry>>,
    shared: RwLock<HashMap<MemoryId, Entry>>,
}

impl LocalVectorIndex {
    pub fn new() -> Self {
        Self {
            private: RwLock::new(HashMap::new()),
            shared: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, collection: Collection) -> &RwLock<HashMap<MemoryId, Entry>> {
        match collection {
            Collection::Private => &self.private,
            Collection::Shared => &self.shared,
        }
    }
}

impl Default for LocalVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStore for LocalVectorIndex {
    fn upsert(&self, collection: Collection, id: MemoryId, vector: Vec<f32>, meta: VectorMeta) {
        self.slot(collection)
            .write()
            .insert(id, Entry { vector, meta });
    }

    fn query(
        &self,
        collection: Collection,
        vector: &[f32],
        filter: &QueryFilter,
        top_k: usize,
    ) -> Vec<ScoredHit> {
        let slot = self.slot(collection).read();
        let mut scored: Vec<(OrderedFloat<f32>, i64, ScoredHit)> = slot
            .iter()
            .filter(|(_, entry)| filter.matches(&entry.meta))
            .map(|(id, entry)| {
                // Clamp into [0, 1]: anti-correlated vectors score 0.
                let score = cosine_similarity(vector, &entry.vector).max(0.0);
                let recency = entry.meta.timestamp.timestamp_nanos_opt().unwrap_or(0);
                (
                    OrderedFloat(score),
                    recency,
                    ScoredHit {
                        id: *id,
                        score,
                        meta: entry.meta.clone(),
                    },
                )
            })
            .collect();

        // Score descending, ties broken by most-recent timestamp.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        scored.into_iter().take(top_k).map(|(_, _, hit)| hit).collect()
    }

    fn len(&self, collection: Collection) -> usize {
        self.slot(collection).read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(agent: &str, channel: &str, types: &[&str], ts: DateTime<Utc>) -> VectorMeta {
        VectorMeta {
            agent_id: agent.to_string(),
            channel: channel.to_string(),
            entity_types: types.iter().map(|s| s.to_string()).collect(),
            timestamp: ts,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &[1.0, 0.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0); // dim mismatch
    }

    #[test]
    fn query_ranks_by_score_then_recency() {
        let idx = LocalVectorIndex::new();
        let now = Utc::now();
        let older = now - chrono::Duration::hours(2);

        let a = MemoryId::new();
        let b = MemoryId::new();
        let c = MemoryId::new();
        idx.upsert(Collection::Private, a, vec![1.0, 0.0], meta("x", "call", &[], older));
        idx.upsert(Collection::Private, b, vec![1.0, 0.0], meta("x", "call", &[], now));
        idx.upsert(Collection::Private, c, vec![0.6, 0.8], meta("x", "call", &[], now));

        let hits = idx.query(Collection::Private, &[1.0, 0.0], &QueryFilter::default(), 10);
        assert_eq!(hits.len(), 3);
        // Equal top scores: newer first.
        assert_eq!(hits[0].id, b);
        assert_eq!(hits[1].id, a);
        assert_eq!(hits[2].id, c);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn filters_apply_before_ranking() {
        let idx = LocalVectorIndex::new();
        let now = Utc::now();
        idx.upsert(
            Collection::Private,
            MemoryId::new(),
            vec![1.0, 0.0],
            meta("a1", "meeting", &["Contact"], now),
        );
        idx.upsert(
            Collection::Private,
            MemoryId::new(),
            vec![1.0, 0.0],
            meta("a1", "email", &["Organization"], now),
        );
        idx.upsert(
            Collection::Private,
            MemoryId::new(),
            vec![1.0, 0.0],
            meta("a2", "meeting", &["Contact"], now),
        );

        let filter = QueryFilter {
            agent_id: Some("a1".into()),
            channel: Some("meeting".into()),
            ..Default::default()
        };
        let hits = idx.query(Collection::Private, &[1.0, 0.0], &filter, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].meta.channel, "meeting");

        let filter = QueryFilter {
            entity_type: Some("organization".into()),
            ..Default::default()
        };
        assert_eq!(idx.query(Collection::Private, &[1.0, 0.0], &filter, 10).len(), 1);

        let filter = QueryFilter {
            from: Some(now + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(idx.query(Collection::Private, &[1.0, 0.0], &filter, 10).is_empty());
    }

    #[test]
    fn collections_are_disjoint() {
        let idx = LocalVectorIndex::new();
        idx.upsert(
            Collection::Shared,
            MemoryId::new(),
            vec![1.0],
            meta("a1", "call", &[], Utc::now()),
        );
        assert_eq!(idx.len(Collection::Shared), 1);
        assert_eq!(idx.len(Collection::Private), 0);
        assert!(idx
            .query(Collection::Private, &[1.0], &QueryFilter::default(), 10)
            .is_empty());
    }

    #[test]
    fn negative_similarity_clamps_to_zero() {
        let idx = LocalVectorIndex::new();
        idx.upsert(
            Collection::Private,
            MemoryId::new(),
            vec![-1.0, 0.0],
            meta("a1", "call", &[], Utc::now()),
        );
        let hits = idx.query(Collection::Private, &[1.0, 0.0], &QueryFilter::default(), 10);
        assert_eq!(hits[0].score, 0.0);
    }
}
