//! Ingestion orchestrator.
//!
//! One interaction moves through:
//!
//! ```text
//! received -> parsed -> chunked -> entities_extracted -> summarized
//!   -> embedded -> stored_private -> (scrubbed -> stored_shared)
//!   -> audited -> complete
//! ```
//!
//! `rejected` is reachable only from `received` (rate limit or
//! malformed input) and has no side effects. Once parsing succeeds the
//! pipeline commits to best effort: every enrichment stage degrades to
//! an empty result instead of aborting, because the interaction record
//! itself must be durably stored. The only hard failure after
//! `received` is the private-store write.
//!
//! Commits are progressive and there is no rollback: a caller
//! disconnect mid-ingest leaves whatever was durable at that point,
//! by design.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::chunking::{chunk_text, ChunkSettings};
use crate::config::ServerConfig;
use crate::enrichment::{mean_pool, EnrichmentBackends, PiiScrubber};
use crate::errors::{AppError, ValidationErrorExt};
use crate::memory::{
    AccessLevel, AgentIdentity, Document, EntityRef, Interaction, MemoryId, MemoryStore,
    ParseStatus, SharedRecord, SharedStore,
};
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::validation;
use crate::vector_index::{Collection, VectorMeta, VectorStore};

/// Per-call settings snapshot, threaded in explicitly so ingestion is
/// testable with varied configurations and never reads ambient state.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunking: ChunkSettings,
    pub scrub_enabled: bool,
    pub auto_share: bool,
    pub entity_catalog: Arc<Vec<String>>,
}

impl IngestSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            chunking: config.chunking,
            scrub_enabled: config.scrub_enabled,
            auto_share: config.auto_share,
            entity_catalog: Arc::new(config.entity_catalog.clone()),
        }
    }
}

/// One attachment as supplied by the caller.
#[derive(Debug, Clone)]
pub struct AttachmentInput {
    pub filename: String,
    pub content: String,
}

/// Raw ingest payload after deserialization, before validation.
#[derive(Debug, Clone)]
pub struct IngestInput {
    pub text: String,
    pub channel: String,
    pub metadata: HashMap<String, String>,
    pub attachments: Vec<AttachmentInput>,
}

/// What the caller gets back.
#[derive(Debug)]
pub struct IngestOutcome {
    pub memory_id: MemoryId,
    pub summary: Option<String>,
    pub entities: Vec<EntityRef>,
    pub shared: bool,
    /// Stage names that degraded to empty output.
    pub degraded: Vec<&'static str>,
}

pub struct IngestOrchestrator {
    store: Arc<MemoryStore>,
    shared_store: Arc<SharedStore>,
    vectors: Arc<dyn VectorStore>,
    backends: Arc<EnrichmentBackends>,
    scrubber: Arc<PiiScrubber>,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLog>,
}

impl IngestOrchestrator {
    pub fn new(
        store: Arc<MemoryStore>,
        shared_store: Arc<SharedStore>,
        vectors: Arc<dyn VectorStore>,
        backends: Arc<EnrichmentBackends>,
        scrubber: Arc<PiiScrubber>,
        limiter: Arc<RateLimiter>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            shared_store,
            vectors,
            backends,
            scrubber,
            limiter,
            audit,
        }
    }

    /// Run one interaction through the pipeline.
    pub async fn ingest(
        &self,
        agent: &AgentIdentity,
        input: IngestInput,
        settings: &IngestSettings,
    ) -> Result<IngestOutcome, AppError> {
        let started = std::time::Instant::now();
        let mut degraded: Vec<&'static str> = Vec::new();

        // -- received: the only gate that can reject -------------------
        if !self.limiter.allow(&agent.agent_id) {
            metrics::INGEST_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(AppError::RateLimited {
                agent_id: agent.agent_id.clone(),
                retry_after_secs: self.limiter.retry_after_secs(&agent.agent_id),
            });
        }
        validation::validate_channel(&input.channel).invalid_field("channel")?;
        validation::validate_content(&input.text, false).invalid_field("text")?;
        validation::validate_metadata(&input.metadata).invalid_field("metadata")?;
        if input.attachments.len() > validation::MAX_ATTACHMENTS {
            return Err(AppError::InvalidInput {
                field: "attachments".into(),
                reason: format!(
                    "too many attachments: {} (max: {})",
                    input.attachments.len(),
                    validation::MAX_ATTACHMENTS
                ),
            });
        }

        // -- parsed: from here on, best effort -------------------------
        let documents: Vec<Document> = input
            .attachments
            .iter()
            .map(|a| {
                let byte_size = a.content.len();
                if byte_size > validation::MAX_ATTACHMENT_BYTES || a.content.trim().is_empty() {
                    Document {
                        filename: a.filename.clone(),
                        byte_size,
                        text: String::new(),
                        status: ParseStatus::Failed,
                    }
                } else {
                    Document {
                        filename: a.filename.clone(),
                        byte_size,
                        text: a.content.clone(),
                        status: ParseStatus::Parsed,
                    }
                }
            })
            .collect();

        let mut interaction = Interaction {
            id: MemoryId::new(),
            agent_id: agent.agent_id.clone(),
            channel: input.channel.clone(),
            text: input.text.clone(),
            metadata: input.metadata.clone(),
            timestamp: Utc::now(),
            documents,
            summary: None,
            entities: Vec::new(),
            embedding: None,
            shared: false,
        };

        // Attachment text takes part in enrichment alongside the body.
        let corpus = build_corpus(&interaction);

        // -- chunked ----------------------------------------------------
        let chunks = chunk_text(&corpus, &settings.chunking);
        debug!(memory_id = %interaction.id, chunks = chunks.len(), "chunked");

        // -- entities_extracted ----------------------------------------
        // The extractor falls through its tiers internally; None means
        // no tier answered, which is a degraded stage like any other.
        interaction.entities = match self
            .backends
            .extractor
            .extract(&corpus, &settings.entity_catalog)
            .await
        {
            Some(entities) => entities
                .into_iter()
                .map(|e| EntityRef {
                    entity_type: e.entity_type,
                    name: e.name,
                    role: "mentioned".to_string(),
                    confidence: e.confidence,
                })
                .collect(),
            None => {
                warn!(memory_id = %interaction.id, "entity extraction degraded: no tier answered");
                metrics::STAGE_DEGRADED_TOTAL.with_label_values(&["entities"]).inc();
                degraded.push("entities");
                Vec::new()
            }
        };

        // -- summarized -------------------------------------------------
        interaction.summary = match self.backends.summarizer.summarize(&corpus).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(memory_id = %interaction.id, "summarization degraded: {e:#}");
                metrics::STAGE_DEGRADED_TOTAL.with_label_values(&["summarize"]).inc();
                degraded.push("summarize");
                None
            }
        };

        // -- embedded ---------------------------------------------------
        interaction.embedding = self.embed_chunks(&chunks, &mut degraded).await;

        // -- stored_private: the durability point ----------------------
        if let Err(e) = self.store.put_interaction(&interaction) {
            metrics::INGEST_TOTAL.with_label_values(&["storage_failed"]).inc();
            self.try_audit(&agent.agent_id, "ingest", AuditOutcome::Failed, &interaction.id);
            return Err(AppError::StorageError(e.to_string()));
        }
        if let Some(vector) = &interaction.embedding {
            self.vectors.upsert(
                Collection::Private,
                interaction.id,
                vector.clone(),
                vector_meta(&interaction),
            );
        }

        // -- scrubbed / stored_shared (conditional) --------------------
        if settings.scrub_enabled && settings.auto_share && agent.access == AccessLevel::Shared {
            match self.share(&interaction, settings).await {
                Ok(()) => {
                    interaction.shared = true;
                    // Derived-field update within the same ingest pass.
                    if let Err(e) = self.store.update_interaction(&interaction) {
                        warn!(memory_id = %interaction.id, "shared-flag update degraded: {e:#}");
                        degraded.push("share_flag");
                    }
                }
                Err(e) => {
                    warn!(memory_id = %interaction.id, "sharing degraded: {e:#}");
                    metrics::STAGE_DEGRADED_TOTAL.with_label_values(&["share"]).inc();
                    degraded.push("share");
                }
            }
        }

        // -- audited ----------------------------------------------------
        let outcome = if degraded.is_empty() {
            AuditOutcome::Ok
        } else {
            AuditOutcome::Degraded
        };
        self.try_audit(&agent.agent_id, "ingest", outcome, &interaction.id);

        // -- complete ---------------------------------------------------
        let result_label = if degraded.is_empty() { "complete" } else { "degraded" };
        metrics::INGEST_TOTAL.with_label_values(&[result_label]).inc();
        metrics::INGEST_DURATION.observe(started.elapsed().as_secs_f64());
        info!(
            memory_id = %interaction.id,
            agent_id = %agent.agent_id,
            channel = %interaction.channel,
            entities = interaction.entities.len(),
            shared = interaction.shared,
            degraded = ?degraded,
            "interaction ingested"
        );

        Ok(IngestOutcome {
            memory_id: interaction.id,
            summary: interaction.summary.clone(),
            entities: interaction.entities.clone(),
            shared: interaction.shared,
            degraded,
        })
    }

    /// Embed each chunk and mean-pool into one vector. Any chunk
    /// failure degrades the whole stage; a partial vector would skew
    /// ranking worse than no vector.
    async fn embed_chunks(
        &self,
        chunks: &[crate::chunking::Chunk],
        degraded: &mut Vec<&'static str>,
    ) -> Option<Vec<f32>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match self.backends.embedder.embed(&chunk.text).await {
                Ok(v) => vectors.push(v),
                Err(e) => {
                    warn!("embedding degraded: {e:#}");
                    metrics::STAGE_DEGRADED_TOTAL.with_label_values(&["embed"]).inc();
                    degraded.push("embed");
                    return None;
                }
            }
        }
        mean_pool(&vectors)
    }

    /// Produce the scrubbed derivative and commit it to the shared
    /// partition. The derivative never carries the raw text: body and
    /// summary both pass through the scrubber, and the vector is
    /// re-computed from the scrubbed text.
    async fn share(
        &self,
        interaction: &Interaction,
        settings: &IngestSettings,
    ) -> anyhow::Result<()> {
        let scrubbed_text = self.scrubber.scrub(&interaction.text);
        let scrubbed_summary = interaction.summary.as_ref().map(|s| self.scrubber.scrub(s));

        let chunks = chunk_text(&scrubbed_text, &settings.chunking);
        let mut vectors = Vec::with_capacity(chunks.len());
        let mut embedding = None;
        for chunk in &chunks {
            match self.backends.embedder.embed(&chunk.text).await {
                Ok(v) => vectors.push(v),
                Err(_) => {
                    // Share without a vector rather than not at all.
                    vectors.clear();
                    break;
                }
            }
        }
        if !vectors.is_empty() {
            embedding = mean_pool(&vectors);
        }

        let record = SharedRecord {
            id: MemoryId::new(),
            source_id: interaction.id,
            agent_id: interaction.agent_id.clone(),
            channel: interaction.channel.clone(),
            scrubbed_text,
            summary: scrubbed_summary,
            entities: interaction.entities.clone(),
            timestamp: interaction.timestamp,
            embedding: embedding.clone(),
        };
        self.shared_store.put(&record)?;

        if let Some(vector) = embedding {
            self.vectors.upsert(
                Collection::Shared,
                record.id,
                vector,
                VectorMeta {
                    agent_id: record.agent_id.clone(),
                    channel: record.channel.clone(),
                    entity_types: record
                        .entities
                        .iter()
                        .map(|e| e.entity_type.clone())
                        .collect(),
                    timestamp: record.timestamp,
                },
            );
        }
        Ok(())
    }

    fn try_audit(&self, agent_id: &str, action: &str, outcome: AuditOutcome, id: &MemoryId) {
        let entry = AuditEntry {
            agent_id: agent_id.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
            outcome,
            detail: id.to_string(),
        };
        if let Err(e) = self.audit.append(&entry) {
            warn!(agent_id, action, "audit append degraded: {e:#}");
            metrics::STAGE_DEGRADED_TOTAL.with_label_values(&["audit"]).inc();
        }
    }
}

/// Body text plus parsed attachment text, in a stable order.
fn build_corpus(interaction: &Interaction) -> String {
    let mut corpus = interaction.text.clone();
    for doc in &interaction.documents {
        if doc.status == ParseStatus::Parsed && !doc.text.is_empty() {
            corpus.push_str("\n\n");
            corpus.push_str(&doc.text);
        }
    }
    corpus
}

fn vector_meta(interaction: &Interaction) -> VectorMeta {
    VectorMeta {
        agent_id: interaction.agent_id.clone(),
        channel: interaction.channel.clone(),
        entity_types: interaction
            .entities
            .iter()
            .map(|e| e.entity_type.clone())
            .collect(),
        timestamp: interaction.timestamp,
    }
}
