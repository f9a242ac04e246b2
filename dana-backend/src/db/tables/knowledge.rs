//! Knowledge base file database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::sqlite::json_col;
use crate::models::{KnowledgeFile, NewKnowledgeFile, UpdateKnowledgeFileRequest};
use super::super::Database;

const FILE_COLUMNS: &str =
    "id, user_id, filename, file_type, file_size, stored_path, category, tags, created_at, updated_at";

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl Database {
    /// Map the shared columns; `content` is read from column 10 when selected
    fn row_to_knowledge_file(row: &Row, with_content: bool) -> SqliteResult<KnowledgeFile> {
        Ok(KnowledgeFile {
            id: row.get(0)?,
            user_id: row.get(1)?,
            filename: row.get(2)?,
            file_type: row.get(3)?,
            file_size: row.get(4)?,
            stored_path: row.get(5)?,
            category: row.get(6)?,
            tags: json_col(row, 7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            content: if with_content { Some(row.get(10)?) } else { None },
        })
    }

    pub fn create_knowledge_file(&self, user_id: i64, file: &NewKnowledgeFile) -> SqliteResult<KnowledgeFile> {
        let id = {
            let conn = self.conn.lock();
            let now = Utc::now().to_rfc3339();
            let tags = serde_json::to_string(&file.tags).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "INSERT INTO knowledge_files (user_id, filename, file_type, file_size, stored_path, content, category, tags, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                rusqlite::params![
                    user_id,
                    &file.filename,
                    &file.file_type,
                    file.file_size,
                    &file.stored_path,
                    &file.content,
                    file.category,
                    &tags,
                    &now
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.get_knowledge_file(user_id, id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Single file including its extracted text
    pub fn get_knowledge_file(&self, user_id: i64, id: i64) -> SqliteResult<Option<KnowledgeFile>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {}, content FROM knowledge_files WHERE id = ?1 AND user_id = ?2", FILE_COLUMNS),
            [id, user_id],
            |row| Self::row_to_knowledge_file(row, true),
        )
        .optional()
    }

    /// File listing without content
    pub fn list_knowledge_files(&self, user_id: i64) -> SqliteResult<Vec<KnowledgeFile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM knowledge_files WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map([user_id], |row| Self::row_to_knowledge_file(row, false))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(files)
    }

    /// Files whose name, text or tags contain `query` (case-insensitive), with content
    pub fn search_knowledge_files(&self, user_id: i64, query: &str, limit: i64) -> SqliteResult<Vec<KnowledgeFile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, content FROM knowledge_files
             WHERE user_id = ?1 AND (
                filename LIKE ?2 ESCAPE '\\' OR content LIKE ?2 ESCAPE '\\' OR tags LIKE ?2 ESCAPE '\\'
             )
             ORDER BY updated_at DESC, id DESC LIMIT ?3",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(rusqlite::params![user_id, like_pattern(query), limit], |row| {
                Self::row_to_knowledge_file(row, true)
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(files)
    }

    pub fn update_knowledge_file(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateKnowledgeFileRequest,
    ) -> SqliteResult<Option<KnowledgeFile>> {
        let now = Utc::now().to_rfc3339();
        let tags = update
            .tags
            .as_ref()
            .map(|t| serde_json::to_string(t).unwrap_or_else(|_| "[]".to_string()));
        let rows = self.conn.lock().execute(
            "UPDATE knowledge_files SET
                category = COALESCE(?1, category),
                tags = COALESCE(?2, tags),
                updated_at = ?3
             WHERE id = ?4 AND user_id = ?5",
            rusqlite::params![update.category, tags, &now, id, user_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_knowledge_file(user_id, id)
    }

    pub fn delete_knowledge_file(&self, user_id: i64, id: i64) -> SqliteResult<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM knowledge_files WHERE id = ?1 AND user_id = ?2", [id, user_id])?;
        Ok(rows > 0)
    }
}
