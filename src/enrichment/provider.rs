//! Thin HTTP client shared by all model-backed enrichment stages.
//!
//! Every external call carries the per-task timeout from
//! `ModelTaskConfig`, so one slow provider cannot stall a request
//! beyond its budget. The wire shape is a single JSON POST per call;
//! provider-specific adapters live behind the stage traits, not here.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ModelTaskConfig;

#[derive(Clone)]
pub struct ModelClient {
    cfg: ModelTaskConfig,
    http: reqwest::Client,
}

impl ModelClient {
    pub fn new(cfg: ModelTaskConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("failed to build HTTP client for model endpoint")?;
        Ok(Self { cfg, http })
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    pub fn provider(&self) -> &str {
        &self.cfg.provider
    }

    /// POST a JSON body to the configured endpoint and decode the
    /// JSON response. Any transport error, timeout, non-2xx status, or
    /// decode failure surfaces as Err; callers degrade from there.
    pub async fn post_json<B: Serialize, R: DeserializeOwned>(&self, body: &B) -> Result<R> {
        let mut req = self.http.post(&self.cfg.endpoint).json(body);
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("model endpoint unreachable: {}", self.cfg.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!(
                "model endpoint {} returned {status}: {}",
                self.cfg.endpoint,
                detail.chars().take(200).collect::<String>()
            );
        }

        resp.json::<R>()
            .await
            .with_context(|| format!("invalid JSON from model endpoint {}", self.cfg.endpoint))
    }
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.cfg.provider)
            .field("model", &self.cfg.model)
            .field("endpoint", &self.cfg.endpoint)
            .finish()
    }
}

/// Completion-style response shared by prompt-driven stages.
#[derive(Debug, serde::Deserialize)]
pub struct CompletionResponse {
    #[serde(alias = "completion", alias = "output")]
    pub text: String,
}
