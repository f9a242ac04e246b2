//! Inbound webhook audit log

use chrono::Utc;
use rusqlite::{Result as SqliteResult, Row};

use crate::db::sqlite::{enum_col, json_col};
use crate::models::{Platform, WebhookEvent};
use super::super::Database;

impl Database {
    fn row_to_webhook_event(row: &Row) -> SqliteResult<WebhookEvent> {
        Ok(WebhookEvent {
            id: row.get(0)?,
            platform: enum_col(row, 1)?,
            payload: json_col(row, 2)?,
            processed_count: row.get(3)?,
            skipped_count: row.get(4)?,
            error: row.get(5)?,
            received_at: row.get(6)?,
        })
    }

    pub fn record_webhook_event(
        &self,
        platform: Platform,
        payload: &serde_json::Value,
        processed_count: i64,
        skipped_count: i64,
        error: Option<&str>,
    ) -> SqliteResult<i64> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO webhook_events (platform, payload, processed_count, skipped_count, error, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![platform.as_ref(), payload.to_string(), processed_count, skipped_count, error, &now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_webhook_events(&self, limit: i64) -> SqliteResult<Vec<WebhookEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, platform, payload, processed_count, skipped_count, error, received_at
             FROM webhook_events ORDER BY id DESC LIMIT ?1",
        )?;
        let events = stmt
            .query_map([limit], Self::row_to_webhook_event)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_and_list_newest_first() {
        let db = Database::new(":memory:").unwrap();
        db.record_webhook_event(Platform::Facebook, &json!({"object": "page"}), 1, 0, None).unwrap();
        db.record_webhook_event(Platform::Whatsapp, &json!({"object": "whatsapp_business_account"}), 0, 2, None)
            .unwrap();

        let events = db.list_webhook_events(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].platform, Platform::Whatsapp);
        assert_eq!(events[0].skipped_count, 2);
        assert_eq!(events[1].payload["object"], "page");
    }
}
