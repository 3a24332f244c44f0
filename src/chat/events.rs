// src/chat/events.rs
// Events emitted to the caller during a streamed turn

use serde::Serialize;

/// Wire events for a streamed chat turn: zero or more `Chunk`s followed by
/// exactly one terminal event (`Done` or `Error`).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Chunk { text: String },
    Done { conversation_id: String },
    Error { message: String },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatEvent::Chunk { .. })
    }
}

/// Response of the blocking (non-streaming) chat call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub assistant_text: String,
    pub conversation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_shape() {
        let chunk = serde_json::to_value(ChatEvent::Chunk {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(chunk["type"], "chunk");
        assert_eq!(chunk["text"], "hi");

        let done = serde_json::to_value(ChatEvent::Done {
            conversation_id: "c1".to_string(),
        })
        .unwrap();
        assert_eq!(done["type"], "done");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!ChatEvent::Chunk { text: String::new() }.is_terminal());
        assert!(ChatEvent::Done { conversation_id: String::new() }.is_terminal());
        assert!(ChatEvent::Error { message: String::new() }.is_terminal());
    }
}
