// src/state.rs
// Shared application state, wired once at startup

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::chat::{ChatConfig, ChatService, ConversationRegistry};
use crate::config::EngineConfig;
use crate::context::{ContextRetriever, RetrieverConfig};
use crate::error::Result;
use crate::llm::TextGenerator;
use crate::memory::{EmbeddingFunction, MemoryStore, RetentionManager, TextChunker, VectorIndex};

/// Everything a request handler needs, built once from config and concrete
/// backends. No global state; callers own an `Arc<AppState>` and hand it
/// around explicitly.
pub struct AppState {
    pub config: EngineConfig,
    pub chat: Arc<ChatService>,
    pub registry: Arc<ConversationRegistry>,
    pub memory: Arc<MemoryStore>,
}

impl AppState {
    /// Wire the service graph from its capability seams. The caller chooses
    /// the concrete generator, embeddings and index (production clients or
    /// test doubles) and this stays the only place they meet.
    pub async fn build(
        config: EngineConfig,
        generator: Arc<dyn TextGenerator>,
        embeddings: Arc<dyn EmbeddingFunction>,
        index: Arc<dyn VectorIndex>,
        pool: SqlitePool,
    ) -> Result<Arc<Self>> {
        ConversationRegistry::init_schema(&pool).await?;

        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        let memory = Arc::new(MemoryStore::new(index, embeddings, chunker));

        let registry = Arc::new(ConversationRegistry::new(pool, memory.clone()));
        let retriever = Arc::new(ContextRetriever::new(
            memory.clone(),
            RetrieverConfig {
                recent_limit: config.context_recent_limit,
                similar_k: config.context_similar_k,
                char_budget: config.context_char_budget,
            },
        ));
        let retention = Arc::new(RetentionManager::new(
            memory.clone(),
            config.retention_keep_last,
        ));

        let chat = Arc::new(ChatService::new(
            generator,
            memory.clone(),
            retriever,
            retention,
            registry.clone(),
            ChatConfig {
                max_message_chars: config.max_message_chars,
                channel_capacity: config.stream_channel_capacity,
            },
        ));

        Ok(Arc::new(Self {
            config,
            chat,
            registry,
            memory,
        }))
    }
}
