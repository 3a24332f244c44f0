// src/chat/prompt.rs
// Prompt assembly for the tutoring persona

use crate::llm::PromptMessage;

/// System instructions for the tutor persona.
pub const TUTOR_SYSTEM_PROMPT: &str = "\
You are an AI Tutor Assistant. Your goal is to help students learn effectively.

Capabilities:
1. Answer academic questions across all subjects
2. Explain concepts in simple, understandable terms
3. Create structured study plans with deadlines
4. Recommend educational resources
5. Provide motivation and encouragement
6. Help with problem-solving and critical thinking

Teaching Style:
- Be patient, supportive, and encouraging
- Break down complex topics into manageable parts
- Use analogies and examples when helpful
- Check for understanding periodically
- Adapt to the student's learning style

Always aim to build confidence and foster a love for learning.";

/// Build the prompt: system instructions, retrieved context (when any), and
/// the user's message, in that order.
pub fn build_prompt(context: &str, user_text: &str) -> Vec<PromptMessage> {
    let mut messages = vec![PromptMessage::system(TUTOR_SYSTEM_PROMPT)];
    if !context.is_empty() {
        messages.push(PromptMessage::system(format!("Context: {}", context)));
    }
    messages.push(PromptMessage::user(user_text));
    messages
}

/// Derive a conversation title from the first message: its leading words,
/// truncated on a character boundary.
pub fn derive_title(text: &str) -> String {
    const MAX_TITLE_CHARS: usize = 60;

    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= MAX_TITLE_CHARS {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(MAX_TITLE_CHARS).collect();
    format!("{}…", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_without_context_has_two_messages() {
        let messages = build_prompt("", "explain photosynthesis");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "explain photosynthesis");
    }

    #[test]
    fn test_prompt_with_context_inserts_system_message() {
        let messages = build_prompt("User: hi\nAssistant: hello", "next question");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, "system");
        assert!(messages[1].content.starts_with("Context: "));
    }

    #[test]
    fn test_derive_title_short_text() {
        assert_eq!(derive_title("What is calculus?"), "What is calculus?");
    }

    #[test]
    fn test_derive_title_truncates_long_text() {
        let long = "a".repeat(200);
        let title = derive_title(&long);
        assert!(title.chars().count() <= 61);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_derive_title_uses_first_line() {
        assert_eq!(derive_title("heading\nrest of message"), "heading");
    }
}
