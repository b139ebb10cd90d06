//! Shared test fixtures: deterministic mock enrichment backends and a
//! service harness over a temp directory.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use smriti_memory::enrichment::{
    DistillLessons, Embed, EnrichmentBackends, EntityExtractor, ExtractedEntity,
    ExtractionStrategy, MinedLesson, Summarize,
};
use smriti_memory::memory::{AccessLevel, AgentIdentity};
use smriti_memory::{ServerConfig, ServiceState};

pub const DIM: usize = 32;

/// Deterministic bag-of-words embedder: hash each lowercased word into
/// a fixed-size bucket vector, then L2-normalize. Shared vocabulary
/// between two texts yields a positive cosine score.
pub struct BagOfWordsEmbedder {
    pub calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a, stable across runs.
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIM as u64) as usize
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0f32; DIM];
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if !word.is_empty() {
            v[bucket(word)] += 1.0;
        }
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embed for BagOfWordsEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(bag_of_words(text))
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embed for FailingEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("embedding endpoint unreachable")
    }
}

pub struct FixedSummarizer(pub &'static str);

#[async_trait]
impl Summarize for FixedSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub struct FailingSummarizer;

#[async_trait]
impl Summarize for FailingSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String> {
        bail!("summarizer endpoint unreachable")
    }
}

pub struct FixedStrategy {
    pub label: &'static str,
    pub entities: Vec<ExtractedEntity>,
}

#[async_trait]
impl ExtractionStrategy for FixedStrategy {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn extract(&self, _text: &str, _catalog: &[String]) -> Result<Vec<ExtractedEntity>> {
        Ok(self.entities.clone())
    }
}

pub struct FailingStrategy(pub &'static str);

#[async_trait]
impl ExtractionStrategy for FailingStrategy {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn extract(&self, _text: &str, _catalog: &[String]) -> Result<Vec<ExtractedEntity>> {
        bail!("extraction service unreachable")
    }
}

pub struct FixedDistiller(pub Vec<MinedLesson>);

#[async_trait]
impl DistillLessons for FixedDistiller {
    async fn distill(&self, _corpus: &str) -> Result<Vec<MinedLesson>> {
        Ok(self.0.clone())
    }
}

/// Distiller that holds the mining run open long enough for a second
/// trigger to observe the run guard.
pub struct SlowDistiller {
    pub delay: std::time::Duration,
    pub lessons: Vec<MinedLesson>,
}

#[async_trait]
impl DistillLessons for SlowDistiller {
    async fn distill(&self, _corpus: &str) -> Result<Vec<MinedLesson>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.lessons.clone())
    }
}

pub struct FailingDistiller;

#[async_trait]
impl DistillLessons for FailingDistiller {
    async fn distill(&self, _corpus: &str) -> Result<Vec<MinedLesson>> {
        bail!("distiller endpoint unreachable")
    }
}

pub fn entity(entity_type: &str, name: &str) -> ExtractedEntity {
    ExtractedEntity {
        entity_type: entity_type.to_string(),
        name: name.to_string(),
        confidence: 0.9,
    }
}

pub fn mined(name: &str, body: &str) -> MinedLesson {
    MinedLesson {
        name: name.to_string(),
        r#type: "general".to_string(),
        body: body.to_string(),
    }
}

pub fn shared_agent(id: &str) -> AgentIdentity {
    AgentIdentity {
        agent_id: id.to_string(),
        access: AccessLevel::Shared,
    }
}

pub fn private_agent(id: &str) -> AgentIdentity {
    AgentIdentity {
        agent_id: id.to_string(),
        access: AccessLevel::Private,
    }
}

pub fn test_config(dir: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.storage_path = dir.path().join("data");
    config.embedding_dim = DIM;
    config.rate_limit.budget = 1_000;
    config
}

/// Backends that succeed everywhere with deterministic output.
pub fn happy_backends() -> EnrichmentBackends {
    EnrichmentBackends {
        extractor: EntityExtractor::new(vec![Arc::new(FixedStrategy {
            label: "ner_service",
            entities: vec![entity("Contact", "John"), entity("Organization", "Acme")],
        })]),
        summarizer: Arc::new(FixedSummarizer("Discussed the Acme renewal.")),
        embedder: Arc::new(BagOfWordsEmbedder::new()),
        distiller: Arc::new(FixedDistiller(vec![])),
    }
}

pub struct Harness {
    pub state: Arc<ServiceState>,
    // Dropped last; deleting the dir under an open RocksDB is an error.
    pub _dir: TempDir,
}

pub fn harness(backends: EnrichmentBackends) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config(&dir);
    let state = Arc::new(ServiceState::with_backends(config, backends).expect("service state"));
    Harness { state, _dir: dir }
}

pub fn harness_with_config(config: ServerConfig, backends: EnrichmentBackends) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config;
    config.storage_path = dir.path().join("data");
    let state = Arc::new(ServiceState::with_backends(config, backends).expect("service state"));
    Harness { state, _dir: dir }
}
