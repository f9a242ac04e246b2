//! User account database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};
use serde::Serialize;

use crate::db::sqlite::enum_col;
use crate::models::{AdminUpdateUserRequest, UpdateProfileRequest, User, UserRole};
use super::super::Database;

const USER_COLUMNS: &str =
    "id, email, password_hash, name, company, timezone, avatar_url, role, is_active, created_at, updated_at";

/// Row counts shown on the admin overview
#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub users: i64,
    pub active_users: i64,
    pub admins: i64,
    pub conversations: i64,
    pub messages: i64,
    pub tasks: i64,
    pub active_subscriptions: i64,
    pub knowledge_files: i64,
}

impl Database {
    fn row_to_user(row: &Row) -> SqliteResult<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            name: row.get(3)?,
            company: row.get(4)?,
            timezone: row.get(5)?,
            avatar_url: row.get(6)?,
            role: enum_col(row, 7)?,
            is_active: row.get::<_, i64>(8)? != 0,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    /// Create a user. The very first account becomes an admin.
    pub fn create_user(&self, email: &str, password_hash: &str, name: Option<&str>) -> SqliteResult<User> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        let existing: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let role = if existing == 0 { UserRole::Admin } else { UserRole::User };

        conn.execute(
            "INSERT INTO users (email, password_hash, name, role, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            rusqlite::params![email, password_hash, name, role.as_ref(), &now],
        )?;
        let id = conn.last_insert_rowid();

        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [id],
            Self::row_to_user,
        )
    }

    pub fn get_user(&self, id: i64) -> SqliteResult<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [id],
            Self::row_to_user,
        )
        .optional()
    }

    pub fn get_user_by_email(&self, email: &str) -> SqliteResult<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            [email],
            Self::row_to_user,
        )
        .optional()
    }

    pub fn list_users(&self) -> SqliteResult<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
        let users = stmt.query_map([], Self::row_to_user)?.collect::<SqliteResult<Vec<_>>>()?;
        Ok(users)
    }

    /// Ids of users that should receive broadcast notifications
    pub fn list_active_user_ids(&self, admins_only: bool) -> SqliteResult<Vec<i64>> {
        let conn = self.conn.lock();
        let sql = if admins_only {
            "SELECT id FROM users WHERE is_active = 1 AND role = 'admin' ORDER BY id"
        } else {
            "SELECT id FROM users WHERE is_active = 1 ORDER BY id"
        };
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt.query_map([], |row| row.get(0))?.collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn update_profile(&self, id: i64, update: &UpdateProfileRequest) -> SqliteResult<Option<User>> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.lock().execute(
            "UPDATE users SET
                name = COALESCE(?1, name),
                company = COALESCE(?2, company),
                timezone = COALESCE(?3, timezone),
                avatar_url = COALESCE(?4, avatar_url),
                updated_at = ?5
             WHERE id = ?6",
            rusqlite::params![update.name, update.company, update.timezone, update.avatar_url, &now, id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_user(id)
    }

    pub fn update_password_hash(&self, id: i64, password_hash: &str) -> SqliteResult<bool> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.lock().execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![password_hash, &now, id],
        )?;
        Ok(rows > 0)
    }

    pub fn admin_update_user(&self, id: i64, update: &AdminUpdateUserRequest) -> SqliteResult<Option<User>> {
        let now = Utc::now().to_rfc3339();
        let role = update.role.map(|r| r.as_ref().to_string());
        let is_active = update.is_active.map(|a| a as i64);
        let rows = self.conn.lock().execute(
            "UPDATE users SET
                name = COALESCE(?1, name),
                role = COALESCE(?2, role),
                is_active = COALESCE(?3, is_active),
                updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![update.name, role, is_active, &now, id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_user(id)
    }

    /// Delete a user and, through cascading keys, everything they own
    pub fn delete_user(&self, id: i64) -> SqliteResult<bool> {
        let rows = self.conn.lock().execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    pub fn admin_stats(&self) -> SqliteResult<AdminStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> SqliteResult<i64> { conn.query_row(sql, [], |row| row.get(0)) };

        Ok(AdminStats {
            users: count("SELECT COUNT(*) FROM users")?,
            active_users: count("SELECT COUNT(*) FROM users WHERE is_active = 1")?,
            admins: count("SELECT COUNT(*) FROM users WHERE role = 'admin'")?,
            conversations: count("SELECT COUNT(*) FROM conversations")?,
            messages: count("SELECT COUNT(*) FROM messages")?,
            tasks: count("SELECT COUNT(*) FROM tasks")?,
            active_subscriptions: count("SELECT COUNT(*) FROM user_subscriptions WHERE status = 'active'")?,
            knowledge_files: count("SELECT COUNT(*) FROM knowledge_files")?,
        })
    }
}
