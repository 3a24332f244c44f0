// src/config/mod.rs
// All tunables load from the environment (.env supported), with defaults

use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    // ── LLM Configuration
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,

    // ── Embeddings Configuration
    pub embedding_base_url: String,
    pub embedding_api_key: String,
    pub embedding_model: String,
    pub embedding_dim: usize,

    // ── Database Configuration
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Qdrant Configuration
    pub qdrant_url: String,
    pub qdrant_collection: String,

    // ── Memory Configuration
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retention_keep_last: usize,

    // ── Context Retrieval
    pub context_recent_limit: usize,
    pub context_similar_k: usize,
    pub context_char_budget: usize,

    // ── Chat Limits
    pub max_message_chars: usize,
    pub stream_channel_capacity: usize,

    // ── Logging Configuration
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean = val.split('#').next().unwrap_or("").trim();
            match clean.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            llm_base_url: env_var_or("LLM_BASE_URL", "https://api.openai.com".to_string()),
            llm_api_key: env_var_or("LLM_API_KEY", String::new()),
            llm_model: env_var_or("LLM_MODEL", "gpt-4o-mini".to_string()),
            llm_temperature: env_var_or("LLM_TEMPERATURE", 0.7),
            llm_max_tokens: env_var_or("LLM_MAX_TOKENS", 1024),
            embedding_base_url: env_var_or(
                "EMBEDDING_BASE_URL",
                "https://api.openai.com".to_string(),
            ),
            embedding_api_key: env_var_or("EMBEDDING_API_KEY", String::new()),
            embedding_model: env_var_or(
                "EMBEDDING_MODEL",
                "text-embedding-3-small".to_string(),
            ),
            embedding_dim: env_var_or("EMBEDDING_DIM", 384),
            database_url: env_var_or("DATABASE_URL", "sqlite:./tutor.db".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 5),
            qdrant_url: env_var_or("QDRANT_URL", "http://localhost:6334".to_string()),
            qdrant_collection: env_var_or("QDRANT_COLLECTION", "tutor-memory".to_string()),
            chunk_size: env_var_or("MEM_CHUNK_SIZE", 500),
            chunk_overlap: env_var_or("MEM_CHUNK_OVERLAP", 50),
            retention_keep_last: env_var_or("MEM_RETENTION_KEEP_LAST", 200),
            context_recent_limit: env_var_or("CONTEXT_RECENT_LIMIT", 20),
            context_similar_k: env_var_or("CONTEXT_SIMILAR_K", 5),
            context_char_budget: env_var_or("CONTEXT_CHAR_BUDGET", 4000),
            max_message_chars: env_var_or("CHAT_MAX_MESSAGE_CHARS", 8000),
            stream_channel_capacity: env_var_or("CHAT_STREAM_CAPACITY", 32),
            log_level: env_var_or("LOG_LEVEL", "info".to_string()),
        }
    }

    /// Fall back to the primary LLM key when no dedicated embeddings key is set.
    pub fn embedding_key(&self) -> &str {
        if self.embedding_api_key.is_empty() {
            &self.llm_api_key
        } else {
            &self.embedding_api_key
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_parses_clean_values() {
        std::env::set_var("TEST_ENGINE_PORT", "42");
        assert_eq!(env_var_or("TEST_ENGINE_PORT", 0usize), 42);
        std::env::remove_var("TEST_ENGINE_PORT");
    }

    #[test]
    fn test_env_var_or_strips_inline_comments() {
        std::env::set_var("TEST_ENGINE_DIM", "384 # embedding width");
        assert_eq!(env_var_or("TEST_ENGINE_DIM", 0usize), 384);
        std::env::remove_var("TEST_ENGINE_DIM");
    }

    #[test]
    fn test_env_var_or_falls_back_on_garbage() {
        std::env::set_var("TEST_ENGINE_BAD", "not-a-number");
        assert_eq!(env_var_or("TEST_ENGINE_BAD", 7usize), 7);
        std::env::remove_var("TEST_ENGINE_BAD");
    }

    #[test]
    fn test_embedding_key_falls_back_to_llm_key() {
        let mut config = EngineConfig::from_env();
        config.llm_api_key = "primary".to_string();
        config.embedding_api_key = String::new();
        assert_eq!(config.embedding_key(), "primary");
        config.embedding_api_key = "dedicated".to_string();
        assert_eq!(config.embedding_key(), "dedicated");
    }
}
