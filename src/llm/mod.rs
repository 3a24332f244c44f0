// src/llm/mod.rs
// Text generation capability and its OpenAI-compatible implementation

pub mod embeddings;
pub mod generator;
mod sse;

pub use embeddings::OpenAiEmbeddings;
pub use generator::OpenAiGenerator;

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

/// A finite, forward-only stream of text deltas. Cancelled by dropping.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One message of a chat prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The text generation capability consumed by the orchestrator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate the full response in one call.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String>;

    /// Open a token stream for the prompt. Deltas arrive in order; the
    /// stream ends on completion or yields a single `Err` on failure.
    async fn stream(&self, messages: &[PromptMessage]) -> Result<TokenStream>;
}
