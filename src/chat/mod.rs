// src/chat/mod.rs

pub mod conversation;
pub mod events;
pub mod prompt;
pub mod service;

pub use conversation::{Conversation, ConversationRegistry, Message};
pub use events::{ChatEvent, ChatReply};
pub use service::{ChatConfig, ChatService};
