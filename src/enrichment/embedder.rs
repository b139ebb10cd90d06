//! Embedding adapter.
//!
//! Returns fixed-dimension vectors from the configured embedding
//! model. A wrong-dimension response is treated as a failure so a
//! misconfigured endpoint can never poison the vector index.

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::provider::ModelClient;

#[async_trait]
pub trait Embed: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct EmbedResponse {
    #[serde(alias = "vector")]
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: ModelClient,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(client: ModelClient, dimension: usize) -> Self {
        Self { client, dimension }
    }
}

#[async_trait]
impl Embed for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp: EmbedResponse = self
            .client
            .post_json(&EmbedRequest {
                model: self.client.model(),
                input: text,
            })
            .await?;
        if resp.embedding.len() != self.dimension {
            bail!(
                "embedding dimension mismatch: got {}, expected {}",
                resp.embedding.len(),
                self.dimension
            );
        }
        Ok(resp.embedding)
    }
}

/// Mean-pool chunk embeddings into one interaction-level vector,
/// L2-normalized so cosine scores stay comparable.
pub fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    let mut acc = vec![0.0f32; dim];
    let mut count = 0usize;
    for v in vectors {
        if v.len() != dim {
            continue;
        }
        for (a, x) in acc.iter_mut().zip(v) {
            *a += x;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    for a in acc.iter_mut() {
        *a /= count as f32;
    }
    let norm = acc.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for a in acc.iter_mut() {
            *a /= norm;
        }
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_averages_and_normalizes() {
        let pooled = mean_pool(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert!((pooled[0] - pooled[1]).abs() < 1e-6);
        let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn mean_pool_empty_is_none() {
        assert!(mean_pool(&[]).is_none());
    }

    #[test]
    fn mean_pool_skips_mismatched_dimensions() {
        let pooled = mean_pool(&[vec![2.0, 0.0], vec![0.0, 0.0, 1.0]]).unwrap();
        assert!((pooled[0] - 1.0).abs() < 1e-6);
    }
}
