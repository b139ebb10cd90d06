//! Retrieval surfaces: semantic search, entity timeline, daily log.
//!
//! Search embeds the query with the same embedder used at ingest and
//! fans out one vector query per collection the caller may read. The
//! private and shared collections are never merged for a caller whose
//! access level does not grant both.
//!
//! Query-side failures are surfaced, never silently partial: an
//! unreachable embedder or a malformed filter fails the whole query.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use ordered_float::OrderedFloat;
use std::sync::Arc;
use tracing::debug;

use crate::constants::{DEFAULT_TOP_K, MAX_TOP_K};
use crate::enrichment::Embed;
use crate::errors::{AppError, ValidationErrorExt};
use crate::memory::{
    AccessLevel, AgentIdentity, Interaction, MemoryId, MemoryStore, SharedStore,
};
use crate::metrics;
use crate::validation;
use crate::vector_index::{Collection, QueryFilter, VectorStore};

/// Search parameters after request validation.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    pub channel: Option<String>,
    pub entity_type: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub include_shared: bool,
}

/// Which partition a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Private,
    Shared,
}

/// One ranked search hit, already joined with its stored record.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub memory_id: MemoryId,
    pub score: f32,
    pub source: HitSource,
    pub agent_id: String,
    pub channel: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

pub struct RetrievalService {
    store: Arc<MemoryStore>,
    shared_store: Arc<SharedStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embed>,
    tz: FixedOffset,
}

impl RetrievalService {
    pub fn new(
        store: Arc<MemoryStore>,
        shared_store: Arc<SharedStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embed>,
        timezone_offset_minutes: i32,
    ) -> Self {
        let tz = FixedOffset::east_opt(timezone_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("UTC offset"));
        Self {
            store,
            shared_store,
            vectors,
            embedder,
            tz,
        }
    }

    /// Semantic search over the caller's readable collections.
    pub async fn search(
        &self,
        agent: &AgentIdentity,
        params: SearchParams,
    ) -> Result<Vec<SearchHit>, AppError> {
        let started = std::time::Instant::now();

        validation::validate_content(&params.query, false).invalid_field("query")?;
        if let Some(channel) = &params.channel {
            validation::validate_channel(channel).invalid_field("channel")?;
        }
        if let Some(entity_type) = &params.entity_type {
            validation::validate_entity_token(entity_type).invalid_field("entity_type")?;
        }
        if params.include_shared && agent.access != AccessLevel::Shared {
            return Err(AppError::InvalidInput {
                field: "include_shared".into(),
                reason: "agent access level does not permit reading the shared partition".into(),
            });
        }
        let limit = params.limit.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);
        let (from, to) = self.date_bounds(params.date_from, params.date_to);

        // Same embedder as ingest; without it there is no meaningful
        // ranking, so this is a query failure, not a degrade.
        let query_vector = self.embedder.embed(&params.query).await.map_err(|e| {
            metrics::SEARCH_TOTAL.with_label_values(&["failed"]).inc();
            AppError::QueryFailed(format!("query embedding unavailable: {e}"))
        })?;

        let mut hits: Vec<SearchHit> = Vec::new();

        let private_filter = QueryFilter {
            agent_id: Some(agent.agent_id.clone()),
            channel: params.channel.clone(),
            entity_type: params.entity_type.clone(),
            from,
            to,
        };
        for hit in self
            .vectors
            .query(Collection::Private, &query_vector, &private_filter, limit)
        {
            if let Some(interaction) = self
                .store
                .get_interaction(&hit.id)
                .map_err(|e| AppError::QueryFailed(e.to_string()))?
            {
                hits.push(SearchHit {
                    memory_id: hit.id,
                    score: hit.score,
                    source: HitSource::Private,
                    agent_id: interaction.agent_id.clone(),
                    channel: interaction.channel.clone(),
                    summary: display_summary(&interaction),
                    timestamp: interaction.timestamp,
                });
            }
        }

        if params.include_shared {
            let shared_filter = QueryFilter {
                agent_id: None, // the shared pool is readable across agents
                channel: params.channel.clone(),
                entity_type: params.entity_type.clone(),
                from,
                to,
            };
            for hit in self
                .vectors
                .query(Collection::Shared, &query_vector, &shared_filter, limit)
            {
                if let Some(record) = self
                    .shared_store
                    .get(&hit.id)
                    .map_err(|e| AppError::QueryFailed(e.to_string()))?
                {
                    hits.push(SearchHit {
                        memory_id: hit.id,
                        score: hit.score,
                        source: HitSource::Shared,
                        agent_id: record.agent_id.clone(),
                        channel: record.channel.clone(),
                        summary: record
                            .summary
                            .clone()
                            .unwrap_or_else(|| snippet(&record.scrubbed_text)),
                        timestamp: record.timestamp,
                    });
                }
            }
        }

        // Merged ranking: score descending, ties by recency.
        hits.sort_by(|a, b| {
            OrderedFloat(b.score)
                .cmp(&OrderedFloat(a.score))
                .then(b.timestamp.cmp(&a.timestamp))
        });
        hits.truncate(limit);

        metrics::SEARCH_TOTAL.with_label_values(&["ok"]).inc();
        metrics::SEARCH_DURATION.observe(started.elapsed().as_secs_f64());
        debug!(agent_id = %agent.agent_id, hits = hits.len(), "semantic search served");
        Ok(hits)
    }

    /// All interactions referencing (entity_type, name), timestamp
    /// ascending.
    pub fn timeline(
        &self,
        agent: &AgentIdentity,
        entity_type: &str,
        name: &str,
    ) -> Result<Vec<Interaction>, AppError> {
        validation::validate_entity_token(entity_type).invalid_field("entity_type")?;
        validation::validate_entity_token(name).invalid_field("entity_name")?;
        self.store
            .timeline(&agent.agent_id, entity_type, name)
            .map_err(|e| AppError::QueryFailed(e.to_string()))
    }

    /// All interactions whose timestamp falls on the given calendar
    /// date in the configured timezone, ascending.
    pub fn daily_log(
        &self,
        agent: &AgentIdentity,
        date: NaiveDate,
    ) -> Result<Vec<Interaction>, AppError> {
        let start = self.day_start_utc(date);
        let end = start + Duration::days(1);
        self.store
            .range_by_time(&agent.agent_id, start, end)
            .map_err(|e| AppError::QueryFailed(e.to_string()))
    }

    fn day_start_utc(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight exists");
        match midnight.and_local_timezone(self.tz) {
            chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
                dt.with_timezone(&Utc)
            }
            chrono::LocalResult::None => DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc),
        }
    }

    fn date_bounds(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (
            from.map(|d| self.day_start_utc(d)),
            // Inclusive end date: the window closes at the next day's start.
            to.map(|d| self.day_start_utc(d) + Duration::days(1)),
        )
    }
}

/// Summary for display: the stored abstract when present, otherwise a
/// bounded snippet of the raw text.
fn display_summary(interaction: &Interaction) -> String {
    interaction
        .summary
        .clone()
        .unwrap_or_else(|| snippet(&interaction.text))
}

fn snippet(text: &str) -> String {
    const MAX: usize = 160;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_respects_char_boundaries() {
        let text = "ä".repeat(200);
        let s = snippet(&text);
        assert!(s.ends_with('…'));
        assert!(s.len() <= 164);
    }

    #[test]
    fn snippet_passes_short_text_through() {
        assert_eq!(snippet("short"), "short");
    }
}
