//! In-app notification database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::sqlite::enum_col;
use crate::models::{Notification, NotificationLevel};
use super::super::Database;

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, level, is_read, created_at";

impl Database {
    fn row_to_notification(row: &Row) -> SqliteResult<Notification> {
        Ok(Notification {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            message: row.get(3)?,
            level: enum_col(row, 4)?,
            is_read: row.get::<_, i64>(5)? != 0,
            created_at: row.get(6)?,
        })
    }

    pub fn create_notification(
        &self,
        user_id: i64,
        title: &str,
        message: &str,
        level: NotificationLevel,
    ) -> SqliteResult<Notification> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO notifications (user_id, title, message, level, is_read, created_at) VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            rusqlite::params![user_id, title, message, level.as_ref(), &now],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS),
            [id],
            Self::row_to_notification,
        )
    }

    /// Same notification for many users in one transaction
    pub fn broadcast_notification(
        &self,
        user_ids: &[i64],
        title: &str,
        message: &str,
        level: NotificationLevel,
    ) -> SqliteResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO notifications (user_id, title, message, level, is_read, created_at) VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            )?;
            for user_id in user_ids {
                stmt.execute(rusqlite::params![user_id, title, message, level.as_ref(), &now])?;
            }
        }
        tx.commit()?;
        Ok(user_ids.len())
    }

    pub fn list_notifications(&self, user_id: i64, unread_only: bool, limit: i64) -> SqliteResult<Vec<Notification>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            NOTIFICATION_COLUMNS
        ))?;
        let notifications = stmt
            .query_map(rusqlite::params![user_id, unread_only as i64, limit], Self::row_to_notification)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(notifications)
    }

    pub fn count_unread_notifications(&self, user_id: i64) -> SqliteResult<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            [user_id],
            |row| row.get(0),
        )
    }

    pub fn mark_notification_read(&self, user_id: i64, id: i64) -> SqliteResult<Option<Notification>> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            [id, user_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        conn.query_row(
            &format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS),
            [id],
            Self::row_to_notification,
        )
        .optional()
    }

    pub fn mark_all_notifications_read(&self, user_id: i64) -> SqliteResult<usize> {
        self.conn.lock().execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            [user_id],
        )
    }

    pub fn delete_notification(&self, user_id: i64, id: i64) -> SqliteResult<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM notifications WHERE id = ?1 AND user_id = ?2", [id, user_id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_state() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        let first = db.create_notification(user.id, "Export ready", "done", NotificationLevel::Success).unwrap();
        db.create_notification(user.id, "Heads up", "x", NotificationLevel::Warning).unwrap();

        assert_eq!(db.count_unread_notifications(user.id).unwrap(), 2);
        let read = db.mark_notification_read(user.id, first.id).unwrap().unwrap();
        assert!(read.is_read);
        assert_eq!(db.list_notifications(user.id, true, 50).unwrap().len(), 1);
        assert_eq!(db.list_notifications(user.id, false, 50).unwrap().len(), 2);

        assert_eq!(db.mark_all_notifications_read(user.id).unwrap(), 1);
        assert_eq!(db.count_unread_notifications(user.id).unwrap(), 0);
    }

    #[test]
    fn test_broadcast_and_owner_scoping() {
        let db = Database::new(":memory:").unwrap();
        let a = db.create_user("a@example.com", "hash", None).unwrap();
        let b = db.create_user("b@example.com", "hash", None).unwrap();

        assert_eq!(db.broadcast_notification(&[a.id, b.id], "Maintenance", "tonight", NotificationLevel::Info).unwrap(), 2);
        let mine = db.list_notifications(a.id, false, 10).unwrap();
        assert_eq!(mine.len(), 1);

        assert!(db.mark_notification_read(b.id, mine[0].id).unwrap().is_none());
        assert!(!db.delete_notification(b.id, mine[0].id).unwrap());
        assert!(db.delete_notification(a.id, mine[0].id).unwrap());
    }
}
