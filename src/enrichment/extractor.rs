//! Entity extraction with a two-tier degrade chain.
//!
//! Tier 1 is a dedicated low-latency NER service; tier 2 is a
//! prompt-driven language model. Each tier is tried at most once per
//! call (this is a degrade chain, not a retry loop), and total failure
//! is reported as `None` rather than an error: extraction must never
//! block storing the underlying interaction, but an outage is still
//! distinguishable from "no entities in the text".
//!
//! The entity taxonomy is administrator-defined and passed in per
//! call. Results outside the catalog are dropped rather than invented.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::provider::{CompletionResponse, ModelClient};
use crate::metrics;

/// A raw extraction hit before catalog normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub entity_type: String,
    pub name: String,
    pub confidence: f32,
}

/// One tier of the extraction chain.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn extract(&self, text: &str, catalog: &[String]) -> Result<Vec<ExtractedEntity>>;
}

/// Ordered strategy chain. First tier that answers wins, even with an
/// empty result; errors fall through to the next tier.
pub struct EntityExtractor {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
}

impl EntityExtractor {
    pub fn new(strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Extract entities. `Some(vec![])` means a tier answered and the
    /// text genuinely had no catalog entities; `None` means no tier
    /// answered at all, so the caller can record the stage as degraded.
    /// Never returns Err.
    pub async fn extract(&self, text: &str, catalog: &[String]) -> Option<Vec<ExtractedEntity>> {
        for strategy in &self.strategies {
            match strategy.extract(text, catalog).await {
                Ok(entities) => {
                    let normalized = normalize(entities, catalog);
                    debug!(
                        strategy = strategy.name(),
                        count = normalized.len(),
                        "entity extraction succeeded"
                    );
                    return Some(normalized);
                }
                Err(e) => {
                    metrics::STAGE_DEGRADED_TOTAL
                        .with_label_values(&[strategy.name()])
                        .inc();
                    warn!(
                        strategy = strategy.name(),
                        "entity extraction tier failed, falling through: {e:#}"
                    );
                }
            }
        }
        None
    }
}

/// Keep only catalog-typed entities (canonicalizing case to the
/// catalog spelling) and dedupe by (type, name) identity.
fn normalize(entities: Vec<ExtractedEntity>, catalog: &[String]) -> Vec<ExtractedEntity> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();
    for mut e in entities {
        let name = e.name.trim();
        if name.is_empty() {
            continue;
        }
        let Some(canonical) = catalog
            .iter()
            .find(|t| t.eq_ignore_ascii_case(e.entity_type.trim()))
        else {
            continue;
        };
        e.entity_type = canonical.clone();
        e.name = name.to_string();
        if seen.insert((e.entity_type.clone(), e.name.to_lowercase())) {
            out.push(e);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tier 1: dedicated NER service
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize)]
struct NerRequest<'a> {
    model: &'a str,
    text: &'a str,
    entity_types: &'a [String],
}

#[derive(Debug, Deserialize)]
struct NerResponseEntity {
    #[serde(alias = "type")]
    entity_type: String,
    #[serde(alias = "text")]
    name: String,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct NerResponse {
    entities: Vec<NerResponseEntity>,
}

/// Low-latency extraction service over HTTP.
pub struct NerServiceStrategy {
    client: ModelClient,
}

impl NerServiceStrategy {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionStrategy for NerServiceStrategy {
    fn name(&self) -> &'static str {
        "ner_service"
    }

    async fn extract(&self, text: &str, catalog: &[String]) -> Result<Vec<ExtractedEntity>> {
        let resp: NerResponse = self
            .client
            .post_json(&NerRequest {
                model: self.client.model(),
                text,
                entity_types: catalog,
            })
            .await?;
        Ok(resp
            .entities
            .into_iter()
            .map(|e| ExtractedEntity {
                entity_type: e.entity_type,
                name: e.name,
                confidence: if e.confidence > 0.0 { e.confidence } else { 0.9 },
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tier 2: language-model fallback
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize)]
struct LlmExtractionRequest<'a> {
    model: &'a str,
    prompt: String,
}

/// Prompt-driven fallback. Slower and less precise than the NER
/// service, but keeps extraction alive when that service is down.
pub struct LlmExtractionStrategy {
    client: ModelClient,
}

impl LlmExtractionStrategy {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    fn build_prompt(text: &str, catalog: &[String]) -> String {
        format!(
            "Extract named entities from the text below. Allowed entity types: {}.\n\
             Respond with a JSON array only, each element {{\"type\": ..., \"name\": ...}}.\n\
             Text:\n{text}",
            catalog.join(", ")
        )
    }
}

#[async_trait]
impl ExtractionStrategy for LlmExtractionStrategy {
    fn name(&self) -> &'static str {
        "llm_fallback"
    }

    async fn extract(&self, text: &str, catalog: &[String]) -> Result<Vec<ExtractedEntity>> {
        let resp: CompletionResponse = self
            .client
            .post_json(&LlmExtractionRequest {
                model: self.client.model(),
                prompt: Self::build_prompt(text, catalog),
            })
            .await?;
        parse_entity_json(&resp.text)
    }
}

#[derive(Debug, Deserialize)]
struct LooseEntity {
    #[serde(alias = "entity_type")]
    r#type: String,
    name: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Parse a model completion into entities. Accepts a bare JSON array
/// or an object with an `entities` field, with or without surrounding
/// prose (the first `[...]` block is used).
pub fn parse_entity_json(raw: &str) -> Result<Vec<ExtractedEntity>> {
    #[derive(Deserialize)]
    struct Wrapper {
        entities: Vec<LooseEntity>,
    }

    let trimmed = raw.trim();
    let list: Vec<LooseEntity> = if let Ok(list) = serde_json::from_str::<Vec<LooseEntity>>(trimmed)
    {
        list
    } else if let Ok(w) = serde_json::from_str::<Wrapper>(trimmed) {
        w.entities
    } else {
        let start = trimmed.find('[').context("no JSON array in model output")?;
        let end = trimmed.rfind(']').context("unterminated JSON array in model output")?;
        serde_json::from_str::<Vec<LooseEntity>>(&trimmed[start..=end])
            .context("model output is not a valid entity array")?
    };

    Ok(list
        .into_iter()
        .map(|e| ExtractedEntity {
            entity_type: e.r#type,
            name: e.name,
            confidence: e.confidence.unwrap_or(0.5),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<String> {
        vec!["Contact".to_string(), "Organization".to_string()]
    }

    struct FailingStrategy;

    #[async_trait]
    impl ExtractionStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn extract(&self, _: &str, _: &[String]) -> Result<Vec<ExtractedEntity>> {
            anyhow::bail!("connection refused")
        }
    }

    struct FixedStrategy(Vec<ExtractedEntity>);

    #[async_trait]
    impl ExtractionStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn extract(&self, _: &str, _: &[String]) -> Result<Vec<ExtractedEntity>> {
            Ok(self.0.clone())
        }
    }

    fn ent(t: &str, n: &str) -> ExtractedEntity {
        ExtractedEntity {
            entity_type: t.to_string(),
            name: n.to_string(),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn falls_through_to_second_tier_on_error() {
        let extractor = EntityExtractor::new(vec![
            Arc::new(FailingStrategy),
            Arc::new(FixedStrategy(vec![ent("Contact", "John"), ent("Organization", "Acme")])),
        ]);
        let out = extractor
            .extract("Met John from Acme", &catalog())
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "John");
        assert_eq!(out[1].entity_type, "Organization");
    }

    #[tokio::test]
    async fn all_tiers_failing_reports_outage() {
        let extractor =
            EntityExtractor::new(vec![Arc::new(FailingStrategy), Arc::new(FailingStrategy)]);
        assert!(extractor.extract("anything", &catalog()).await.is_none());
    }

    #[tokio::test]
    async fn no_tiers_configured_reports_outage() {
        let extractor = EntityExtractor::new(vec![]);
        assert!(extractor.extract("anything", &catalog()).await.is_none());
    }

    #[tokio::test]
    async fn first_tier_empty_success_does_not_fall_through() {
        let extractor = EntityExtractor::new(vec![
            Arc::new(FixedStrategy(vec![])),
            Arc::new(FixedStrategy(vec![ent("Contact", "John")])),
        ]);
        let out = extractor
            .extract("no entities here", &catalog())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn normalization_drops_unknown_types_and_dupes() {
        let extractor = EntityExtractor::new(vec![Arc::new(FixedStrategy(vec![
            ent("contact", "John"),
            ent("Contact", "john"),
            ent("Starship", "Enterprise"),
            ent("Organization", "  "),
        ]))]);
        let out = extractor.extract("x", &catalog()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_type, "Contact"); // canonical casing
    }

    #[test]
    fn parses_bare_array_and_wrapped_and_prose() {
        let bare = r#"[{"type":"Contact","name":"John"}]"#;
        assert_eq!(parse_entity_json(bare).unwrap().len(), 1);

        let wrapped = r#"{"entities":[{"type":"Organization","name":"Acme"}]}"#;
        assert_eq!(parse_entity_json(wrapped).unwrap()[0].name, "Acme");

        let prose = "Sure! Here you go: [{\"type\":\"Contact\",\"name\":\"John\"}] Done.";
        assert_eq!(parse_entity_json(prose).unwrap().len(), 1);

        assert!(parse_entity_json("no json at all").is_err());
    }
}
