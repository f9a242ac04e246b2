//! Conversation and message database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};
use serde::Deserialize;

use crate::db::sqlite::enum_col;
use crate::models::{
    Conversation, ConversationStatus, Message, Platform, SenderType, Sentiment,
    UpdateConversationRequest,
};
use super::super::Database;

const CONVERSATION_COLUMNS: &str =
    "id, user_id, platform, external_id, client_name, status, created_at, updated_at, last_message_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_type, content, sentiment, platform_message_id, created_at";

/// Optional list filters, taken straight from the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub platform: Option<Platform>,
}

impl Database {
    fn row_to_conversation(row: &Row) -> SqliteResult<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            user_id: row.get(1)?,
            platform: enum_col(row, 2)?,
            external_id: row.get(3)?,
            client_name: row.get(4)?,
            status: enum_col(row, 5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            last_message_at: row.get(8)?,
        })
    }

    fn row_to_message(row: &Row) -> SqliteResult<Message> {
        Ok(Message {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sender_type: enum_col(row, 2)?,
            content: row.get(3)?,
            sentiment: enum_col(row, 4)?,
            platform_message_id: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn create_conversation(
        &self,
        user_id: i64,
        platform: Platform,
        external_id: &str,
        client_name: Option<&str>,
    ) -> SqliteResult<Conversation> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO conversations (user_id, platform, external_id, client_name, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?5)",
            rusqlite::params![user_id, platform.as_ref(), external_id, client_name, &now],
        )?;
        let id = conn.last_insert_rowid();

        conn.query_row(
            &format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
            [id],
            Self::row_to_conversation,
        )
    }

    /// Find the thread for a platform counterpart, opening one if needed.
    /// A closed thread is reopened when the counterpart writes again.
    pub fn get_or_create_conversation(
        &self,
        user_id: i64,
        platform: Platform,
        external_id: &str,
        client_name: Option<&str>,
    ) -> SqliteResult<Conversation> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR IGNORE INTO conversations (user_id, platform, external_id, client_name, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?5)",
            rusqlite::params![user_id, platform.as_ref(), external_id, client_name, &now],
        )?;
        conn.execute(
            "UPDATE conversations SET status = 'open', client_name = COALESCE(client_name, ?4), updated_at = ?5
             WHERE user_id = ?1 AND platform = ?2 AND external_id = ?3 AND status = 'closed'",
            rusqlite::params![user_id, platform.as_ref(), external_id, client_name, &now],
        )?;

        conn.query_row(
            &format!(
                "SELECT {} FROM conversations WHERE user_id = ?1 AND platform = ?2 AND external_id = ?3",
                CONVERSATION_COLUMNS
            ),
            rusqlite::params![user_id, platform.as_ref(), external_id],
            Self::row_to_conversation,
        )
    }

    /// Fetch a conversation owned by `user_id`
    pub fn get_conversation(&self, user_id: i64, id: i64) -> SqliteResult<Option<Conversation>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM conversations WHERE id = ?1 AND user_id = ?2", CONVERSATION_COLUMNS),
            [id, user_id],
            Self::row_to_conversation,
        )
        .optional()
    }

    pub fn list_conversations(&self, user_id: i64, filter: &ConversationFilter) -> SqliteResult<Vec<Conversation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2) AND (?3 IS NULL OR platform = ?3)
             ORDER BY COALESCE(last_message_at, created_at) DESC, id DESC",
            CONVERSATION_COLUMNS
        ))?;

        let status = filter.status.map(|s| s.as_ref().to_string());
        let platform = filter.platform.map(|p| p.as_ref().to_string());
        let conversations = stmt
            .query_map(rusqlite::params![user_id, status, platform], Self::row_to_conversation)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(conversations)
    }

    pub fn update_conversation(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateConversationRequest,
    ) -> SqliteResult<Option<Conversation>> {
        let now = Utc::now().to_rfc3339();
        let status = update.status.map(|s| s.as_ref().to_string());
        let rows = self.conn.lock().execute(
            "UPDATE conversations SET
                status = COALESCE(?1, status),
                client_name = COALESCE(?2, client_name),
                updated_at = ?3
             WHERE id = ?4 AND user_id = ?5",
            rusqlite::params![status, update.client_name, &now, id, user_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_conversation(user_id, id)
    }

    /// Delete a conversation; its messages cascade
    pub fn delete_conversation(&self, user_id: i64, id: i64) -> SqliteResult<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM conversations WHERE id = ?1 AND user_id = ?2", [id, user_id])?;
        Ok(rows > 0)
    }

    /// Append a message and bump the conversation's activity timestamp
    pub fn add_message(
        &self,
        conversation_id: i64,
        sender_type: SenderType,
        content: &str,
        sentiment: Sentiment,
        platform_message_id: Option<&str>,
    ) -> SqliteResult<Message> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (conversation_id, sender_type, content, sentiment, platform_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![conversation_id, sender_type.as_ref(), content, sentiment.as_ref(), platform_message_id, &now],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "UPDATE conversations SET last_message_at = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![&now, conversation_id],
        )?;

        conn.query_row(
            &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
            [id],
            Self::row_to_message,
        )
    }

    /// Whether a platform message id was already stored (webhook redelivery)
    pub fn message_exists(&self, conversation_id: i64, platform_message_id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 AND platform_message_id = ?2",
            rusqlite::params![conversation_id, platform_message_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_messages(&self, conversation_id: i64) -> SqliteResult<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        ))?;
        let messages = stmt
            .query_map([conversation_id], Self::row_to_message)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(messages)
    }
}
