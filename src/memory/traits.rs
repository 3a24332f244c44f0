// src/memory/traits.rs
// Capability seams for the memory subsystem

use crate::memory::types::{MemoryRecord, Scope};
use anyhow::Result;
use async_trait::async_trait;

/// A record plus its embedding, ready for upsert into a vector index.
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub record: MemoryRecord,
    pub vector: Vec<f32>,
}

/// Turns text into a fixed-length vector. Implementations must return
/// vectors of exactly `dimensions()` floats.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Default batch implementation embeds sequentially; HTTP-backed
    /// implementations override this with a single batched request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;
}

/// Append-only, filterable, similarity-searchable record index.
///
/// Upserts are idempotent by point id. `scroll` returns records in insertion
/// order; ranked ordering is only provided by `query`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()>;

    /// Up to `k` records ranked by similarity to `vector`, filtered to scope.
    async fn query(&self, vector: &[f32], scope: &Scope, k: usize) -> Result<Vec<MemoryRecord>>;

    /// Records matching the scope in insertion order. `None` means all.
    async fn scroll(&self, scope: &Scope, limit: Option<usize>) -> Result<Vec<MemoryRecord>>;

    /// Remove records by id. Deleting absent ids is not an error.
    async fn delete(&self, ids: &[u64]) -> Result<()>;

    /// Remove every record matching the scope.
    async fn delete_by_scope(&self, scope: &Scope) -> Result<()>;
}
