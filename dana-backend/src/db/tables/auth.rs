//! Auth session database operations

use chrono::{Duration, Utc};
use rand::RngCore;
use rusqlite::{OptionalExtension, Result as SqliteResult};

use crate::models::{Session, User};
use super::super::Database;

/// 32 random bytes, hex encoded
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Database {
    /// Create a new bearer session for a user; `ttl_hours` must be positive
    pub fn create_session(&self, user_id: i64, ttl_hours: i64) -> SqliteResult<Session> {
        let created_at = Utc::now();
        let expires_at = Duration::try_hours(ttl_hours)
            .filter(|ttl| *ttl > Duration::zero())
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                rusqlite::Error::ToSqlConversionFailure(format!("invalid session lifetime of {} hours", ttl_hours).into())
            })?;
        let conn = self.conn.lock();
        let token = generate_token();

        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![&token, user_id, created_at.to_rfc3339(), expires_at.to_rfc3339()],
        )?;

        Ok(Session {
            id: conn.last_insert_rowid(),
            token,
            user_id,
            created_at,
            expires_at,
        })
    }

    /// Look up a session; expired sessions are deleted and reported as missing
    pub fn validate_session(&self, token: &str) -> SqliteResult<Option<Session>> {
        let conn = self.conn.lock();

        let session = conn
            .query_row(
                "SELECT id, token, user_id, created_at, expires_at FROM auth_sessions WHERE token = ?1",
                [token],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        token: row.get(1)?,
                        user_id: row.get(2)?,
                        created_at: row.get(3)?,
                        expires_at: row.get(4)?,
                    })
                },
            )
            .optional()?;

        match session {
            Some(s) if s.expires_at <= Utc::now() => {
                conn.execute("DELETE FROM auth_sessions WHERE id = ?1", [s.id])?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Resolve a bearer token to its user
    pub fn get_session_user(&self, token: &str) -> SqliteResult<Option<User>> {
        match self.validate_session(token)? {
            Some(session) => self.get_user(session.user_id),
            None => Ok(None),
        }
    }

    pub fn delete_session(&self, token: &str) -> SqliteResult<bool> {
        let rows = self.conn.lock().execute("DELETE FROM auth_sessions WHERE token = ?1", [token])?;
        Ok(rows > 0)
    }

    /// Drop every session of a user (password change, deactivation)
    pub fn delete_user_sessions(&self, user_id: i64) -> SqliteResult<usize> {
        self.conn.lock().execute("DELETE FROM auth_sessions WHERE user_id = ?1", [user_id])
    }

    pub fn purge_expired_sessions(&self) -> SqliteResult<usize> {
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute("DELETE FROM auth_sessions WHERE expires_at <= ?1", [&now])
    }
}
