// src/chat/conversation.rs
// Conversation identity, ownership and lifecycle over SQLite

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::memory::{MemoryStore, Role, Scope};

/// A titled, owned thread of messages.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored message. Immutable once created; removed only when its
/// conversation is deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Owns conversation rows and their messages, and enforces that every
/// operation is scoped to the owning user before any side effect happens.
pub struct ConversationRegistry {
    pool: SqlitePool,
    memory: Arc<MemoryStore>,
}

impl ConversationRegistry {
    pub fn new(pool: SqlitePool, memory: Arc<MemoryStore>) -> Self {
        Self { pool, memory }
    }

    /// Create the backing tables if they do not exist yet.
    pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn create(&self, user_id: &str, title: &str) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!("created conversation {} for user {}", conversation.id, user_id);
        Ok(conversation)
    }

    /// All conversations for a user, most recently active first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, created_at, updated_at
            FROM conversations
            WHERE user_id = ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_conversation).collect()
    }

    /// Fetch a conversation, rejecting callers that do not own it.
    pub async fn get(&self, conversation_id: &str, user_id: &str) -> Result<Conversation> {
        let row = sqlx::query(
            "SELECT id, user_id, title, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| EngineError::NotFound(conversation_id.to_string()))?;

        let conversation = row_to_conversation(&row)?;
        if conversation.user_id != user_id {
            return Err(EngineError::Unauthorized(conversation_id.to_string()));
        }
        Ok(conversation)
    }

    /// Delete a conversation, its messages, and (best-effort) its memory
    /// records. Memory failure here is logged inside the store, not fatal.
    pub async fn delete(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let conversation = self.get(conversation_id, user_id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(&conversation.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(&conversation.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let scope = Scope::conversation(user_id, &conversation.id);
        self.memory.delete_scope(&scope).await;

        info!("deleted conversation {} for user {}", conversation.id, user_id);
        Ok(())
    }

    /// Append the completed (user, assistant) pair and bump `updated_at`.
    pub async fn record_turn(
        &self,
        conversation_id: &str,
        user_text: &str,
        user_at: DateTime<Utc>,
        assistant_text: &str,
        assistant_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(Role::User.as_str())
        .bind(user_text)
        .bind(user_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(Role::Assistant.as_str())
        .bind(assistant_text)
        .bind(assistant_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(assistant_at.to_rfc3339())
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("recorded turn for conversation {}", conversation_id);
        Ok(())
    }

    /// Messages for a conversation in ascending creation order.
    pub async fn history(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        self.get(conversation_id, user_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Number of messages stored for a conversation.
    pub async fn message_count(&self, conversation_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation> {
    Ok(Conversation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let role: String = row.get("role");
    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: role.parse().map_err(EngineError::Other)?,
        content: row.get("content"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Other(anyhow::anyhow!("bad timestamp {:?}: {}", raw, e)))
}
