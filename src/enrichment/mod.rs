//! Enrichment stages: everything between raw text and a stored,
//! searchable record.
//!
//! Each stage is a trait so the pipeline can be exercised with mock
//! backends in tests and so providers stay swappable per task type.
//! Stages configured without an endpoint are wired to [`Unavailable`],
//! which fails immediately and lets the pipeline degrade.

pub mod embedder;
pub mod extractor;
pub mod provider;
pub mod scrubber;
pub mod summarizer;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub use embedder::{mean_pool, Embed, HttpEmbedder};
pub use extractor::{
    EntityExtractor, ExtractedEntity, ExtractionStrategy, LlmExtractionStrategy,
    NerServiceStrategy,
};
pub use provider::ModelClient;
pub use scrubber::PiiScrubber;
pub use summarizer::{HttpSummarizer, Summarize};

use crate::config::{ModelTask, ServerConfig};
use provider::CompletionResponse;

/// A lesson candidate produced by the distillation model.
#[derive(Debug, Clone, Deserialize)]
pub struct MinedLesson {
    pub name: String,
    #[serde(alias = "lesson_type", default = "default_lesson_type")]
    pub r#type: String,
    pub body: String,
}

fn default_lesson_type() -> String {
    "general".to_string()
}

#[async_trait]
pub trait DistillLessons: Send + Sync {
    async fn distill(&self, corpus: &str) -> Result<Vec<MinedLesson>>;
}

#[derive(Debug, serde::Serialize)]
struct DistillRequest<'a> {
    model: &'a str,
    prompt: String,
}

pub struct HttpDistiller {
    client: ModelClient,
}

impl HttpDistiller {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DistillLessons for HttpDistiller {
    async fn distill(&self, corpus: &str) -> Result<Vec<MinedLesson>> {
        let prompt = format!(
            "Distill reusable lessons from the interaction log below. \
             Respond with a JSON array only, each element \
             {{\"name\": ..., \"type\": ..., \"body\": ...}}. \
             Return [] when nothing is worth keeping.\n\n{corpus}"
        );
        let resp: CompletionResponse = self
            .client
            .post_json(&DistillRequest {
                model: self.client.model(),
                prompt,
            })
            .await?;
        parse_lesson_json(&resp.text)
    }
}

/// Parse distiller output, tolerating prose around the JSON array.
pub fn parse_lesson_json(raw: &str) -> Result<Vec<MinedLesson>> {
    let trimmed = raw.trim();
    if let Ok(list) = serde_json::from_str::<Vec<MinedLesson>>(trimmed) {
        return Ok(list);
    }
    let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) else {
        bail!("no JSON array in distiller output");
    };
    Ok(serde_json::from_str::<Vec<MinedLesson>>(&trimmed[start..=end])?)
}

/// Stand-in for any stage without a configured endpoint.
pub struct Unavailable {
    task: &'static str,
    dimension: usize,
}

impl Unavailable {
    pub fn new(task: &'static str) -> Self {
        Self { task, dimension: 0 }
    }

    pub fn with_dimension(task: &'static str, dimension: usize) -> Self {
        Self { task, dimension }
    }
}

#[async_trait]
impl Summarize for Unavailable {
    async fn summarize(&self, _text: &str) -> Result<String> {
        bail!("no {} endpoint configured", self.task)
    }
}

#[async_trait]
impl Embed for Unavailable {
    fn dimension(&self) -> usize {
        self.dimension
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("no {} endpoint configured", self.task)
    }
}

#[async_trait]
impl DistillLessons for Unavailable {
    async fn distill(&self, _corpus: &str) -> Result<Vec<MinedLesson>> {
        bail!("no {} endpoint configured", self.task)
    }
}

/// The full set of enrichment backends the pipeline consumes.
/// Built from configuration in production; tests inject mocks.
pub struct EnrichmentBackends {
    pub extractor: EntityExtractor,
    pub summarizer: Arc<dyn Summarize>,
    pub embedder: Arc<dyn Embed>,
    pub distiller: Arc<dyn DistillLessons>,
}

impl EnrichmentBackends {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let mut strategies: Vec<Arc<dyn ExtractionStrategy>> = Vec::new();
        if let Some(cfg) = config.models.get(&ModelTask::Extract) {
            strategies.push(Arc::new(NerServiceStrategy::new(ModelClient::new(
                cfg.clone(),
            )?)));
        }
        // The LLM fallback reuses the distill/summarize provider when no
        // dedicated extraction LLM is configured.
        if let Some(cfg) = config
            .models
            .get(&ModelTask::Distill)
            .or_else(|| config.models.get(&ModelTask::Summarize))
        {
            strategies.push(Arc::new(LlmExtractionStrategy::new(ModelClient::new(
                cfg.clone(),
            )?)));
        }

        let summarizer: Arc<dyn Summarize> = match config.models.get(&ModelTask::Summarize) {
            Some(cfg) => Arc::new(HttpSummarizer::new(ModelClient::new(cfg.clone())?)),
            None => Arc::new(Unavailable::new("summarize")),
        };

        let embedder: Arc<dyn Embed> = match config.models.get(&ModelTask::Embed) {
            Some(cfg) => Arc::new(HttpEmbedder::new(
                ModelClient::new(cfg.clone())?,
                config.embedding_dim,
            )),
            None => Arc::new(Unavailable::with_dimension("embed", config.embedding_dim)),
        };

        let distiller: Arc<dyn DistillLessons> = match config.models.get(&ModelTask::Distill) {
            Some(cfg) => Arc::new(HttpDistiller::new(ModelClient::new(cfg.clone())?)),
            None => Arc::new(Unavailable::new("distill")),
        };

        Ok(Self {
            extractor: EntityExtractor::new(strategies),
            summarizer,
            embedder,
            distiller,
        })
    }
}
