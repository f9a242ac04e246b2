//! Aggregation queries behind the dashboard

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Result as SqliteResult;
use serde::Serialize;

use super::super::Database;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlatformCount {
    pub platform: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyActivity {
    pub date: String,
    pub count: i64,
}

/// First client message and first reply of one conversation
#[derive(Debug, Clone)]
pub struct ResponseTimeSample {
    pub conversation_id: i64,
    pub first_client_at: DateTime<Utc>,
    pub first_reply_at: DateTime<Utc>,
}

impl Database {
    fn grouped_counts(&self, sql: &str, user_id: i64) -> SqliteResult<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn conversation_status_counts(&self, user_id: i64) -> SqliteResult<Vec<StatusCount>> {
        Ok(self
            .grouped_counts(
                "SELECT status, COUNT(*) FROM conversations WHERE user_id = ?1 GROUP BY status ORDER BY status",
                user_id,
            )?
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }

    pub fn conversation_platform_counts(&self, user_id: i64) -> SqliteResult<Vec<PlatformCount>> {
        Ok(self
            .grouped_counts(
                "SELECT platform, COUNT(*) FROM conversations WHERE user_id = ?1 GROUP BY platform ORDER BY platform",
                user_id,
            )?
            .into_iter()
            .map(|(platform, count)| PlatformCount { platform, count })
            .collect())
    }

    pub fn task_status_counts(&self, user_id: i64) -> SqliteResult<Vec<StatusCount>> {
        Ok(self
            .grouped_counts(
                "SELECT status, COUNT(*) FROM tasks WHERE user_id = ?1 GROUP BY status ORDER BY status",
                user_id,
            )?
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }

    pub fn message_count(&self, user_id: i64) -> SqliteResult<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM messages m JOIN conversations c ON c.id = m.conversation_id WHERE c.user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
    }

    /// Open tasks whose due date is before `today`
    pub fn overdue_task_count(&self, user_id: i64, today: NaiveDate) -> SqliteResult<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ?1 AND status != 'done' AND due_date IS NOT NULL AND due_date < ?2",
            rusqlite::params![user_id, today],
            |row| row.get(0),
        )
    }

    pub fn response_time_samples(&self, user_id: i64) -> SqliteResult<Vec<ResponseTimeSample>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, first_client, (
                SELECT MIN(r.created_at) FROM messages r
                WHERE r.conversation_id = firsts.id AND r.sender_type IN ('agent', 'ai') AND r.created_at >= firsts.first_client
             ) AS first_reply
             FROM (
                SELECT c.id AS id, (
                    SELECT MIN(m.created_at) FROM messages m WHERE m.conversation_id = c.id AND m.sender_type = 'client'
                ) AS first_client
                FROM conversations c WHERE c.user_id = ?1
             ) AS firsts
             WHERE first_client IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, DateTime<Utc>>(1)?,
                    row.get::<_, Option<DateTime<Utc>>>(2)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(conversation_id, first_client_at, reply)| {
                reply.map(|first_reply_at| ResponseTimeSample {
                    conversation_id,
                    first_client_at,
                    first_reply_at,
                })
            })
            .collect())
    }

    /// Stored sentiment label counts for client messages since `since`
    pub fn client_sentiment_counts(&self, user_id: i64, since: DateTime<Utc>) -> SqliteResult<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT m.sentiment, COUNT(*) FROM messages m JOIN conversations c ON c.id = m.conversation_id
             WHERE c.user_id = ?1 AND m.sender_type = 'client' AND m.created_at >= ?2
             GROUP BY m.sentiment",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![user_id, since.to_rfc3339()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// Raw text of client messages since `since`, for topic classification
    pub fn client_message_texts(&self, user_id: i64, since: DateTime<Utc>) -> SqliteResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT m.content FROM messages m JOIN conversations c ON c.id = m.conversation_id
             WHERE c.user_id = ?1 AND m.sender_type = 'client' AND m.created_at >= ?2",
        )?;
        let texts = stmt
            .query_map(rusqlite::params![user_id, since.to_rfc3339()], |row| row.get(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        Ok(texts)
    }

    /// Message counts per UTC day (only days with traffic)
    pub fn daily_message_counts(&self, user_id: i64, since: DateTime<Utc>) -> SqliteResult<Vec<DailyActivity>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT substr(m.created_at, 1, 10) AS day, COUNT(*) FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE c.user_id = ?1 AND m.created_at >= ?2
             GROUP BY day ORDER BY day",
        )?;
        let days = stmt
            .query_map(rusqlite::params![user_id, since.to_rfc3339()], |row| {
                Ok(DailyActivity { date: row.get(0)?, count: row.get(1)? })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(days)
    }
}
