// src/lib.rs
// Conversational tutoring engine: memory-augmented streaming chat

pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod memory;
pub mod state;
pub mod testing;

pub use chat::{ChatEvent, ChatReply, ChatService, ConversationRegistry};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use state::AppState;
