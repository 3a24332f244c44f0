// tests/test_helpers.rs

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use tutor_engine::config::EngineConfig;
use tutor_engine::state::AppState;
use tutor_engine::testing::{InMemoryIndex, MockEmbeddings, ScriptedGenerator};

pub const DIM: usize = 32;

/// An engine wired entirely from in-process doubles, plus handles to those
/// doubles for assertions.
pub struct TestEngine {
    pub state: Arc<AppState>,
    pub index: Arc<InMemoryIndex>,
    pub embeddings: Arc<MockEmbeddings>,
    pub generator: Arc<ScriptedGenerator>,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        llm_base_url: "http://unused".to_string(),
        llm_api_key: String::new(),
        llm_model: "scripted".to_string(),
        llm_temperature: 0.0,
        llm_max_tokens: 256,
        embedding_base_url: "http://unused".to_string(),
        embedding_api_key: String::new(),
        embedding_model: "mock".to_string(),
        embedding_dim: DIM,
        database_url: ":memory:".to_string(),
        sqlite_max_connections: 1,
        qdrant_url: "http://unused".to_string(),
        qdrant_collection: "unused".to_string(),
        chunk_size: 500,
        chunk_overlap: 50,
        retention_keep_last: 200,
        context_recent_limit: 20,
        context_similar_k: 5,
        context_char_budget: 4000,
        max_message_chars: 8000,
        stream_channel_capacity: 32,
        log_level: "debug".to_string(),
    }
}

pub async fn engine_with(generator: ScriptedGenerator) -> TestEngine {
    engine_with_config(generator, test_config()).await
}

pub async fn engine_with_config(generator: ScriptedGenerator, config: EngineConfig) -> TestEngine {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("create in-memory sqlite");

    let index = Arc::new(InMemoryIndex::new());
    let embeddings = Arc::new(MockEmbeddings::new(config.embedding_dim));
    let generator = Arc::new(generator);

    let state = AppState::build(
        config,
        generator.clone(),
        embeddings.clone(),
        index.clone(),
        pool,
    )
    .await
    .expect("build app state");

    TestEngine {
        state,
        index,
        embeddings,
        generator,
    }
}
