//! Central service state: stores, indices, pipeline, and background
//! jobs, wired once at startup and shared behind an Arc.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::audit::AuditLog;
use crate::config::ServerConfig;
use crate::enrichment::{EnrichmentBackends, PiiScrubber};
use crate::lessons::LessonMiner;
use crate::memory::{MemoryStore, SharedStore};
use crate::pipeline::{IngestOrchestrator, IngestSettings};
use crate::rate_limit::RateLimiter;
use crate::retrieval::RetrievalService;
use crate::vector_index::{Collection, LocalVectorIndex, VectorMeta, VectorStore};

pub struct ServiceState {
    pub config: ServerConfig,
    pub store: Arc<MemoryStore>,
    pub shared_store: Arc<SharedStore>,
    pub audit: Arc<AuditLog>,
    pub vectors: Arc<LocalVectorIndex>,
    pub orchestrator: IngestOrchestrator,
    pub retrieval: RetrievalService,
    pub miner: LessonMiner,
    pub ingest_settings: IngestSettings,
    started_at: Instant,
}

impl ServiceState {
    /// Production wiring: enrichment backends come from configuration.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let backends = EnrichmentBackends::from_config(&config)?;
        Self::with_backends(config, backends)
    }

    /// Test wiring: callers inject their own enrichment backends.
    pub fn with_backends(config: ServerConfig, backends: EnrichmentBackends) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_path).with_context(|| {
            format!("failed to create storage dir {}", config.storage_path.display())
        })?;

        let store = Arc::new(MemoryStore::open(&config.storage_path.join("primary"))?);
        let shared_store = Arc::new(SharedStore::open(&config.storage_path.join("shared"))?);
        let audit = Arc::new(AuditLog::open(
            &config.storage_path.join("audit"),
            config.audit_retention_days,
            config.audit_max_entries,
        )?);

        let vectors = Arc::new(LocalVectorIndex::new());
        rebuild_index(&store, &shared_store, &vectors)?;

        let scrubber = Arc::new(PiiScrubber::new(&config.pii_rules)?);
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let backends = Arc::new(backends);

        let orchestrator = IngestOrchestrator::new(
            store.clone(),
            shared_store.clone(),
            vectors.clone() as Arc<dyn VectorStore>,
            backends.clone(),
            scrubber,
            limiter,
            audit.clone(),
        );
        let retrieval = RetrievalService::new(
            store.clone(),
            shared_store.clone(),
            vectors.clone() as Arc<dyn VectorStore>,
            backends.embedder.clone(),
            config.timezone_offset_minutes,
        );
        let miner = LessonMiner::new(
            store.clone(),
            backends.distiller.clone(),
            audit.clone(),
            config.mining.clone(),
        );

        let ingest_settings = IngestSettings::from_config(&config);

        Ok(Self {
            config,
            store,
            shared_store,
            audit,
            vectors,
            orchestrator,
            retrieval,
            miner,
            ingest_settings,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Flush every durable store. Idempotent; used by the sync
    /// endpoint and the shutdown path.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()?;
        self.shared_store.flush()?;
        self.audit.flush()?;
        Ok(())
    }
}

/// Vectors ride along on stored rows; rebuild the in-process index
/// from both partitions at startup.
fn rebuild_index(
    store: &MemoryStore,
    shared_store: &SharedStore,
    vectors: &LocalVectorIndex,
) -> Result<()> {
    let mut private_count = 0usize;
    for interaction in store.scan_interactions()? {
        if let Some(vector) = &interaction.embedding {
            vectors.upsert(
                Collection::Private,
                interaction.id,
                vector.clone(),
                VectorMeta {
                    agent_id: interaction.agent_id.clone(),
                    channel: interaction.channel.clone(),
                    entity_types: interaction
                        .entities
                        .iter()
                        .map(|e| e.entity_type.clone())
                        .collect(),
                    timestamp: interaction.timestamp,
                },
            );
            private_count += 1;
        }
    }

    let mut shared_count = 0usize;
    for record in shared_store.scan()? {
        if let Some(vector) = &record.embedding {
            vectors.upsert(
                Collection::Shared,
                record.id,
                vector.clone(),
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
            shared_count += 1;
        }
    }

    info!(private_count, shared_count, "vector index rebuilt from store");
    Ok(())
}
