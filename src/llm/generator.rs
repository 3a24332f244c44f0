// src/llm/generator.rs
// OpenAI-compatible chat completions client

use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::sse::sse_json_stream;
use crate::llm::{PromptMessage, TextGenerator, TokenStream};

/// Connection settings for the chat completions endpoint.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

pub struct OpenAiGenerator {
    client: Client,
    config: GeneratorConfig,
}

impl OpenAiGenerator {
    pub fn new(client: Client, config: GeneratorConfig) -> Self {
        Self { client, config }
    }

    fn request_body(&self, messages: &[PromptMessage], stream: bool) -> Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": stream,
        })
    }

    async fn send(&self, body: Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .json(&body)
            .send()
            .await
            .context("chat completions request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".into());
            return Err(anyhow::anyhow!("chat completions error ({}): {}", status, body));
        }
        Ok(resp)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        let resp = self.send(self.request_body(messages, false)).await?;
        let value: Value = resp.json().await.context("invalid completion response")?;

        let text = value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("completion response had no content"))?;

        debug!("completion returned {} chars", text.len());
        Ok(text.to_string())
    }

    async fn stream(&self, messages: &[PromptMessage]) -> Result<TokenStream> {
        let resp = self.send(self.request_body(messages, true)).await?;
        let mut events = Box::pin(sse_json_stream(resp.bytes_stream()));

        let stream = try_stream! {
            while let Some(event) = events.next().await {
                let event = event?;

                if let Some(error) = event.get("error") {
                    let message = error
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown upstream error");
                    Err(anyhow::anyhow!("stream failed: {}", message))?;
                }

                if let Some(delta) = event
                    .pointer("/choices/0/delta/content")
                    .and_then(|c| c.as_str())
                {
                    if !delta.is_empty() {
                        yield delta.to_string();
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
