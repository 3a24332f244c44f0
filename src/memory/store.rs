// src/memory/store.rs
// Cache-style memory store over a vector index

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::memory::chunker::TextChunker;
use crate::memory::traits::{EmbeddingFunction, IndexPoint, VectorIndex};
use crate::memory::types::{MemoryRecord, Scope, TurnMessage};

/// Append-only conversational memory backed by an external vector index.
///
/// Every operation degrades softly: a failing backend produces a logged
/// warning and an empty result (or a skipped write), never an error. The
/// chat path must stay alive when memory is down.
pub struct MemoryStore {
    index: Arc<dyn VectorIndex>,
    embeddings: Arc<dyn EmbeddingFunction>,
    chunker: TextChunker,
}

impl MemoryStore {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embeddings: Arc<dyn EmbeddingFunction>,
        chunker: TextChunker,
    ) -> Self {
        Self {
            index,
            embeddings,
            chunker,
        }
    }

    /// Chunk, embed and upsert the given turn messages under `scope`.
    ///
    /// Point ids are a stable hash of (scope, chunk, timestamp), so storing
    /// the identical content twice re-upserts the same points instead of
    /// duplicating them. Failures are logged and swallowed.
    pub async fn store(&self, scope: &Scope, messages: &[TurnMessage]) {
        let mut chunks: Vec<String> = Vec::new();
        let mut records: Vec<MemoryRecord> = Vec::new();

        for message in messages {
            if message.content.trim().is_empty() {
                continue;
            }
            for chunk in self.chunker.chunk_text(&message.content) {
                let id = record_id(scope, &chunk, message.timestamp);
                records.push(MemoryRecord {
                    id,
                    user_id: scope.user_id.clone(),
                    conversation_id: scope.conversation_id.clone(),
                    role: message.role,
                    content: chunk.clone(),
                    timestamp: message.timestamp,
                    score: None,
                });
                chunks.push(chunk);
            }
        }

        if chunks.is_empty() {
            return;
        }

        let vectors = match retry_once(|| self.embeddings.embed_batch(&chunks)).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!("skipping memory write for {}: embedding failed: {:#}", scope, e);
                return;
            }
        };

        if vectors.len() != records.len() {
            warn!(
                "skipping memory write for {}: expected {} embeddings, got {}",
                scope,
                records.len(),
                vectors.len()
            );
            return;
        }

        let points: Vec<IndexPoint> = records
            .into_iter()
            .zip(vectors)
            .map(|(record, vector)| IndexPoint { record, vector })
            .collect();
        let count = points.len();

        match retry_once(|| self.index.upsert(points.clone())).await {
            Ok(()) => debug!("stored {} memory records for {}", count, scope),
            Err(e) => warn!("failed to store memory for {}: {:#}", scope, e),
        }
    }

    /// Up to `k` records ranked by similarity to `query_text`, filtered to
    /// scope. Empty on backend failure.
    pub async fn query_similar(&self, scope: &Scope, query_text: &str, k: usize) -> Vec<MemoryRecord> {
        let vector = match retry_once(|| self.embeddings.embed(query_text)).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("similarity query for {} degraded to empty: {:#}", scope, e);
                return Vec::new();
            }
        };

        match retry_once(|| self.index.query(&vector, scope, k)).await {
            Ok(records) => records,
            Err(e) => {
                warn!("similarity query for {} degraded to empty: {:#}", scope, e);
                Vec::new()
            }
        }
    }

    /// The most recent `limit` records for the scope, in ascending timestamp
    /// order. Empty on backend failure.
    pub async fn query_recent(&self, scope: &Scope, limit: usize) -> Vec<MemoryRecord> {
        let mut records = self.scope_records(scope).await;
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        records
    }

    /// Every record for the scope in ascending timestamp order. Empty on
    /// backend failure. Used by retention to find pruning candidates.
    pub async fn scope_records(&self, scope: &Scope) -> Vec<MemoryRecord> {
        let mut records = match retry_once(|| self.index.scroll(scope, None)).await {
            Ok(records) => records,
            Err(e) => {
                warn!("recency query for {} degraded to empty: {:#}", scope, e);
                return Vec::new();
            }
        };
        // Stable sort keeps insertion order for records sharing a timestamp.
        records.sort_by_key(|r| r.timestamp);
        records
    }

    /// Remove records by id. Idempotent; failures are logged.
    pub async fn delete(&self, ids: &[u64]) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = retry_once(|| self.index.delete(ids)).await {
            warn!("failed to delete {} memory records: {:#}", ids.len(), e);
        }
    }

    /// Remove every record for the scope (conversation cascade). Best-effort.
    pub async fn delete_scope(&self, scope: &Scope) {
        if let Err(e) = retry_once(|| self.index.delete_by_scope(scope)).await {
            warn!("failed to delete memory scope {}: {:#}", scope, e);
        }
    }
}

/// Deterministic point id: truncated SHA-256 of (scope, content, timestamp).
/// Re-upserting an identical write lands on the same point.
pub fn record_id(scope: &Scope, content: &str, timestamp: DateTime<Utc>) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(scope.user_id.as_bytes());
    hasher.update(b"|");
    if let Some(conv) = &scope.conversation_id {
        hasher.update(conv.as_bytes());
    }
    hasher.update(b"|");
    hasher.update(content.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().unwrap_or([0; 8]))
}

/// Run an index/embedding call with a single bounded retry before giving up.
/// The chat response must never block indefinitely on the memory subsystem.
async fn retry_once<T, F, Fut>(mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            debug!("memory backend call failed, retrying once: {:#}", first);
            op().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_deterministic() {
        let scope = Scope::conversation("u1", "c1");
        let ts = Utc::now();
        assert_eq!(record_id(&scope, "hello", ts), record_id(&scope, "hello", ts));
    }

    #[test]
    fn test_record_id_varies_by_scope_and_content() {
        let ts = Utc::now();
        let a = record_id(&Scope::conversation("u1", "c1"), "hello", ts);
        let b = record_id(&Scope::conversation("u1", "c2"), "hello", ts);
        let c = record_id(&Scope::conversation("u1", "c1"), "goodbye", ts);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_retry_once_recovers_from_single_failure() {
        let mut attempts = 0;
        let result = retry_once(|| {
            attempts += 1;
            let fail = attempts == 1;
            async move {
                if fail {
                    Err(anyhow::anyhow!("transient"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_once_gives_up_after_second_failure() {
        let mut attempts = 0;
        let result: anyhow::Result<i32> = retry_once(|| {
            attempts += 1;
            async move { Err(anyhow::anyhow!("down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 2);
    }
}
