//! kbchat-embed
//!
//! Query embedding for the vector half of hybrid retrieval. [`AzureEmbedder`]
//! calls an Azure OpenAI embeddings deployment; [`FakeEmbedder`] hashes tokens
//! into a fixed-size unit vector so development and tests never need the network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use kbchat_core::config::{EmbeddingBackend, EmbeddingSettings, GenerationSettings, OpenAiTarget};
use kbchat_core::traits::Embedder;

pub struct AzureEmbedder {
    client: reqwest::Client,
    target: OpenAiTarget,
    dim: usize,
}

impl AzureEmbedder {
    pub fn new(client: reqwest::Client, target: OpenAiTarget, dim: usize) -> Self { Self { client, target, dim } }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.target.endpoint, self.target.deployment, self.target.api_version
        )
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for AzureEmbedder {
    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.target.api_key)
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Embedding API error {}: {}", status, body));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("No embedding in response"))
    }
}

/// Deterministic bag-of-tokens embedder. Same text, same unit vector.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> { Ok(self.embed_sync(text)) }
}

fn fake_forced_by_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Build the embedder selected by configuration.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the fake embedder regardless of backend.
pub fn embedder_from_settings(
    client: reqwest::Client,
    settings: &EmbeddingSettings,
    generation: &GenerationSettings,
) -> Result<Arc<dyn Embedder>> {
    if fake_forced_by_env() || settings.backend == EmbeddingBackend::Fake {
        tracing::info!(dim = settings.dim, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dim)));
    }
    let target = settings.azure(generation)?;
    tracing::info!(deployment = %target.deployment, "using Azure OpenAI embeddings");
    Ok(Arc::new(AzureEmbedder::new(client, target, settings.dim)))
}
