// src/llm/embeddings.rs
// OpenAI-compatible embeddings client

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;

use crate::memory::EmbeddingFunction;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embeddings over an OpenAI-compatible `/v1/embeddings` endpoint, requesting
/// a fixed output dimension so the index's vector size stays stable whatever
/// model sits behind the URL.
pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddings {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
        }
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": input,
            "dimensions": self.dimensions,
        });

        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&body)
            .send()
            .await
            .context("embeddings request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".into());
            return Err(anyhow::anyhow!("embeddings error ({}): {}", status, body));
        }

        let mut parsed: EmbeddingResponse =
            resp.json().await.context("invalid embeddings response")?;

        // Output order follows the `index` field, not arrival order.
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingFunction for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embeddings response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
