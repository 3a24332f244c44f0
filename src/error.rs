// src/error.rs
// Standardized error types for the engine

use thiserror::Error;

/// Main error type surfaced by the chat engine.
///
/// Memory-subsystem failures (vector index, embeddings) are deliberately
/// absent: those degrade silently inside `MemoryStore` and never reach the
/// caller. Only authorization, validation, database and generator failures
/// are visible.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("conversation {0} is owned by another user")]
    Unauthorized(String),

    #[error("conversation {0} not found")]
    NotFound(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience type alias for Result using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// True for errors the caller caused (bad input or bad ownership),
    /// as opposed to engine-side failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::Unauthorized(_) | EngineError::NotFound(_) | EngineError::InvalidMessage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_display() {
        let err = EngineError::Unauthorized("conv-1".to_string());
        assert!(err.to_string().contains("conv-1"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_invalid_message_display() {
        let err = EngineError::InvalidMessage("empty message".to_string());
        assert!(err.to_string().contains("empty message"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_generation_is_not_rejection() {
        let err = EngineError::Generation("upstream unreachable".to_string());
        assert!(!err.is_rejection());
    }
}
