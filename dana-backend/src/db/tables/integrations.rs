//! Integration config database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};
use serde_json::{Map, Value};

use crate::db::sqlite::{enum_col, json_col};
use crate::models::{IntegrationConfig, IntegrationKind, IntegrationStatus};
use super::super::Database;

const INTEGRATION_COLUMNS: &str =
    "id, user_id, integration_type, config, status, last_sync_at, last_error, created_at, updated_at";

impl Database {
    fn row_to_integration(row: &Row) -> SqliteResult<IntegrationConfig> {
        Ok(IntegrationConfig {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: enum_col(row, 2)?,
            config: json_col(row, 3)?,
            status: enum_col(row, 4)?,
            last_sync_at: row.get(5)?,
            last_error: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Insert or replace the config for (user, kind); resets status to active
    pub fn upsert_integration(
        &self,
        user_id: i64,
        kind: IntegrationKind,
        config: &Map<String, Value>,
    ) -> SqliteResult<IntegrationConfig> {
        let now = Utc::now().to_rfc3339();
        let config_json = Value::Object(config.clone()).to_string();

        self.conn.lock().execute(
            "INSERT INTO integration_configs (user_id, integration_type, config, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?4)
             ON CONFLICT(user_id, integration_type) DO UPDATE SET
                config = excluded.config,
                status = 'active',
                last_error = NULL,
                updated_at = excluded.updated_at",
            rusqlite::params![user_id, kind.as_ref(), &config_json, &now],
        )?;

        self.get_integration(user_id, kind)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_integration(&self, user_id: i64, kind: IntegrationKind) -> SqliteResult<Option<IntegrationConfig>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM integration_configs WHERE user_id = ?1 AND integration_type = ?2",
                INTEGRATION_COLUMNS
            ),
            rusqlite::params![user_id, kind.as_ref()],
            Self::row_to_integration,
        )
        .optional()
    }

    pub fn list_integrations(&self, user_id: i64) -> SqliteResult<Vec<IntegrationConfig>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM integration_configs WHERE user_id = ?1 ORDER BY integration_type",
            INTEGRATION_COLUMNS
        ))?;
        let configs = stmt
            .query_map([user_id], Self::row_to_integration)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(configs)
    }

    /// Find the tenant config whose `field` equals `value` (webhook routing by page / phone id)
    pub fn find_integration_by_field(
        &self,
        kind: IntegrationKind,
        field: &str,
        value: &str,
    ) -> SqliteResult<Option<IntegrationConfig>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM integration_configs
                 WHERE integration_type = ?1 AND json_extract(config, '$.' || ?2) = ?3
                 ORDER BY id LIMIT 1",
                INTEGRATION_COLUMNS
            ),
            rusqlite::params![kind.as_ref(), field, value],
            Self::row_to_integration,
        )
        .optional()
    }

    /// Record the outcome of a sync run
    pub fn record_integration_sync(
        &self,
        user_id: i64,
        kind: IntegrationKind,
        error: Option<&str>,
    ) -> SqliteResult<Option<IntegrationConfig>> {
        let now = Utc::now().to_rfc3339();
        let status = if error.is_some() { IntegrationStatus::Error } else { IntegrationStatus::Active };

        let rows = self.conn.lock().execute(
            "UPDATE integration_configs SET
                status = ?1,
                last_error = ?2,
                last_sync_at = CASE WHEN ?2 IS NULL THEN ?3 ELSE last_sync_at END,
                updated_at = ?3
             WHERE user_id = ?4 AND integration_type = ?5",
            rusqlite::params![status.as_ref(), error, &now, user_id, kind.as_ref()],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_integration(user_id, kind)
    }

    pub fn delete_integration(&self, user_id: i64, kind: IntegrationKind) -> SqliteResult<bool> {
        let rows = self.conn.lock().execute(
            "DELETE FROM integration_configs WHERE user_id = ?1 AND integration_type = ?2",
            rusqlite::params![user_id, kind.as_ref()],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_one_config_per_user_and_type() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();

        let first = db
            .upsert_integration(user.id, IntegrationKind::Slack, &config(json!({"bot_token": "xoxb-1"})))
            .unwrap();
        db.record_integration_sync(user.id, IntegrationKind::Slack, Some("boom")).unwrap();
        let second = db
            .upsert_integration(user.id, IntegrationKind::Slack, &config(json!({"bot_token": "xoxb-2"})))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.field("bot_token"), Some("xoxb-2"));
        assert_eq!(second.status, IntegrationStatus::Active);
        assert!(second.last_error.is_none());
        assert_eq!(db.list_integrations(user.id).unwrap().len(), 1);
    }

    #[test]
    fn test_record_sync_outcome() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        db.upsert_integration(user.id, IntegrationKind::Hubspot, &config(json!({"access_token": "t"})))
            .unwrap();

        let ok = db.record_integration_sync(user.id, IntegrationKind::Hubspot, None).unwrap().unwrap();
        assert!(ok.last_sync_at.is_some());

        let failed = db
            .record_integration_sync(user.id, IntegrationKind::Hubspot, Some("401 Unauthorized"))
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, IntegrationStatus::Error);
        assert_eq!(failed.last_error.as_deref(), Some("401 Unauthorized"));
        assert_eq!(failed.last_sync_at, ok.last_sync_at);

        assert!(db.record_integration_sync(user.id, IntegrationKind::Zendesk, None).unwrap().is_none());
    }

    #[test]
    fn test_find_by_field_routes_to_tenant() {
        let db = Database::new(":memory:").unwrap();
        let a = db.create_user("a@example.com", "hash", None).unwrap();
        let b = db.create_user("b@example.com", "hash", None).unwrap();
        db.upsert_integration(a.id, IntegrationKind::Facebook, &config(json!({"page_id": "111", "page_access_token": "x"})))
            .unwrap();
        db.upsert_integration(b.id, IntegrationKind::Facebook, &config(json!({"page_id": "222", "page_access_token": "y"})))
            .unwrap();

        let found = db
            .find_integration_by_field(IntegrationKind::Facebook, "page_id", "222")
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, b.id);
        assert!(db
            .find_integration_by_field(IntegrationKind::Instagram, "page_id", "222")
            .unwrap()
            .is_none());
    }
}
