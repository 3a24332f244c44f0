// src/memory/mod.rs
// Conversational memory: chunking, embedding, vector storage, retention

pub mod chunker;
pub mod qdrant;
pub mod retention;
pub mod store;
pub mod traits;
pub mod types;

pub use chunker::TextChunker;
pub use qdrant::QdrantIndex;
pub use retention::RetentionManager;
pub use store::MemoryStore;
pub use traits::{EmbeddingFunction, IndexPoint, VectorIndex};
pub use types::{MemoryRecord, Role, Scope, TurnMessage};
