//! Summarization adapter.
//!
//! Thin wrapper over the configured summarization model. Failure or
//! timeout means "no summary", never a failed ingest.

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::provider::{CompletionResponse, ModelClient};

#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

#[derive(Debug, serde::Serialize)]
struct SummarizeRequest<'a> {
    model: &'a str,
    task: &'static str,
    input: &'a str,
}

pub struct HttpSummarizer {
    client: ModelClient,
}

impl HttpSummarizer {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarize for HttpSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let resp: CompletionResponse = self
            .client
            .post_json(&SummarizeRequest {
                model: self.client.model(),
                task: "summarize",
                input: text,
            })
            .await?;
        let summary = resp.text.trim().to_string();
        if summary.is_empty() {
            bail!("summarization model returned empty output");
        }
        Ok(summary)
    }
}
