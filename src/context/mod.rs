// src/context/mod.rs
// Selects prior turns and assembles the bounded context string

use std::sync::Arc;

use tracing::debug;

use crate::memory::{MemoryRecord, MemoryStore, Scope};

/// How much history the retriever pulls and how large the rendered context
/// may grow.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Records fetched for an existing conversation (recency path).
    pub recent_limit: usize,
    /// Records fetched for a fresh conversation (user-wide similarity path).
    pub similar_k: usize,
    /// Character budget for the rendered context string.
    pub char_budget: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            recent_limit: 20,
            similar_k: 5,
            char_budget: 4000,
        }
    }
}

/// Builds the context block prepended to a new prompt.
///
/// Within a known conversation the most recent turns win; without one, the
/// user's history across all conversations is searched by similarity. An
/// empty result is a normal outcome for new users, never an error.
pub struct ContextRetriever {
    store: Arc<MemoryStore>,
    config: RetrieverConfig,
}

impl ContextRetriever {
    pub fn new(store: Arc<MemoryStore>, config: RetrieverConfig) -> Self {
        Self { store, config }
    }

    pub async fn retrieve(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        query_text: &str,
    ) -> String {
        let records = match conversation_id {
            Some(conv) => {
                let scope = Scope::conversation(user_id, conv);
                self.store
                    .query_recent(&scope, self.config.recent_limit)
                    .await
            }
            None => {
                let scope = Scope::user(user_id);
                let mut matches = self
                    .store
                    .query_similar(&scope, query_text, self.config.similar_k)
                    .await;
                // Similarity hits are re-ordered chronologically so the
                // rendered context reads as a conversation.
                matches.sort_by_key(|r| r.timestamp);
                matches
            }
        };

        if records.is_empty() {
            debug!("no context records for user {}", user_id);
            return String::new();
        }

        render_context(&records, self.config.char_budget)
    }
}

/// Render records as "{Role}: {content}" lines within the character budget,
/// dropping oldest (or lowest-ranked) entries first.
fn render_context(records: &[MemoryRecord], char_budget: usize) -> String {
    let lines: Vec<String> = records
        .iter()
        .map(|r| format!("{}: {}", r.role.display_name(), r.content))
        .collect();

    // Walk newest-to-oldest and keep whole lines until the budget is spent,
    // so oldest entries fall off first.
    let mut kept: Vec<&String> = Vec::new();
    let mut used = 0;
    for line in lines.iter().rev() {
        let cost = line.len() + if kept.is_empty() { 0 } else { 1 };
        if used + cost > char_budget {
            break;
        }
        used += cost;
        kept.push(line);
    }

    kept.reverse();
    kept.iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;
    use chrono::Utc;

    fn record(role: Role, content: &str) -> MemoryRecord {
        MemoryRecord {
            id: 0,
            user_id: "u1".to_string(),
            conversation_id: Some("c1".to_string()),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            score: None,
        }
    }

    #[test]
    fn test_render_formats_role_lines() {
        let records = vec![
            record(Role::User, "what is recursion?"),
            record(Role::Assistant, "a function calling itself"),
        ];
        let context = render_context(&records, 4000);
        assert_eq!(
            context,
            "User: what is recursion?\nAssistant: a function calling itself"
        );
    }

    #[test]
    fn test_render_drops_oldest_first_when_over_budget() {
        let records = vec![
            record(Role::User, "oldest entry that should be dropped"),
            record(Role::Assistant, "newest"),
        ];
        let context = render_context(&records, 20);
        assert_eq!(context, "Assistant: newest");
    }

    #[test]
    fn test_render_empty_when_nothing_fits() {
        let records = vec![record(Role::User, "far too long for the tiny budget")];
        let context = render_context(&records, 5);
        assert!(context.is_empty());
    }
}
