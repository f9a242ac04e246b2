//! Task database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::sqlite::enum_col;
use crate::models::{CreateTaskRequest, Task, TaskPriority, TaskStatus, UpdateTaskRequest};
use super::super::Database;

const TASK_COLUMNS: &str =
    "id, user_id, conversation_id, title, description, status, priority, due_date, created_at, updated_at";

impl Database {
    fn row_to_task(row: &Row) -> SqliteResult<Task> {
        Ok(Task {
            id: row.get(0)?,
            user_id: row.get(1)?,
            conversation_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            status: enum_col(row, 5)?,
            priority: enum_col(row, 6)?,
            due_date: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    pub fn create_task(&self, user_id: i64, req: &CreateTaskRequest) -> SqliteResult<Task> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let status = req.status.unwrap_or(TaskStatus::Todo);
        let priority = req.priority.unwrap_or(TaskPriority::Medium);

        conn.execute(
            "INSERT INTO tasks (user_id, conversation_id, title, description, status, priority, due_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                user_id,
                req.conversation_id,
                req.title.trim(),
                req.description,
                status.as_ref(),
                priority.as_ref(),
                req.due_date,
                &now
            ],
        )?;
        let id = conn.last_insert_rowid();

        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            [id],
            Self::row_to_task,
        )
    }

    pub fn get_task(&self, user_id: i64, id: i64) -> SqliteResult<Option<Task>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1 AND user_id = ?2", TASK_COLUMNS),
            [id, user_id],
            Self::row_to_task,
        )
        .optional()
    }

    pub fn list_tasks(&self, user_id: i64, status: Option<TaskStatus>) -> SqliteResult<Vec<Task>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY due_date IS NULL, due_date ASC, id DESC",
            TASK_COLUMNS
        ))?;
        let status = status.map(|s| s.as_ref().to_string());
        let tasks = stmt
            .query_map(rusqlite::params![user_id, status], Self::row_to_task)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(tasks)
    }

    pub fn update_task(&self, user_id: i64, id: i64, update: &UpdateTaskRequest) -> SqliteResult<Option<Task>> {
        let now = Utc::now().to_rfc3339();
        let status = update.status.map(|s| s.as_ref().to_string());
        let priority = update.priority.map(|p| p.as_ref().to_string());
        let title = update.title.as_deref().map(str::trim);
        let description = update.description.as_ref().map(|d| d.as_deref());
        let rows = self.conn.lock().execute(
            "UPDATE tasks SET
                title = COALESCE(?1, title),
                description = CASE WHEN ?2 THEN ?3 ELSE description END,
                status = COALESCE(?4, status),
                priority = COALESCE(?5, priority),
                due_date = CASE WHEN ?6 THEN ?7 ELSE due_date END,
                conversation_id = CASE WHEN ?8 THEN ?9 ELSE conversation_id END,
                updated_at = ?10
             WHERE id = ?11 AND user_id = ?12",
            rusqlite::params![
                title,
                description.is_some(),
                description.flatten(),
                status,
                priority,
                update.due_date.is_some(),
                update.due_date.flatten(),
                update.conversation_id.is_some(),
                update.conversation_id.flatten(),
                &now,
                id,
                user_id
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_task(user_id, id)
    }

    pub fn delete_task(&self, user_id: i64, id: i64) -> SqliteResult<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM tasks WHERE id = ?1 AND user_id = ?2", [id, user_id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use chrono::NaiveDate;

    fn request(title: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            title: title.to_string(),
            description: None,
            status: None,
            priority: None,
            due_date: None,
            conversation_id: None,
        }
    }

    #[test]
    fn test_create_defaults_and_update() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();

        let task = db.create_task(user.id, &request("  Call back  ")).unwrap();
        assert_eq!(task.title, "Call back");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Medium);

        let due = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        let updated = db
            .update_task(user.id, task.id, &UpdateTaskRequest {
                status: Some(TaskStatus::Done),
                due_date: Some(Some(due)),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.due_date, Some(due));
        assert_eq!(updated.title, "Call back");

        assert_eq!(db.list_tasks(user.id, Some(TaskStatus::Done)).unwrap().len(), 1);
        assert!(db.list_tasks(user.id, Some(TaskStatus::Todo)).unwrap().is_empty());
    }

    #[test]
    fn test_conversation_delete_detaches_task() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        let conv = db.create_conversation(user.id, Platform::Web, "v", None).unwrap();

        let mut req = request("Follow up");
        req.conversation_id = Some(conv.id);
        let task = db.create_task(user.id, &req).unwrap();

        db.delete_conversation(user.id, conv.id).unwrap();
        let task = db.get_task(user.id, task.id).unwrap().unwrap();
        assert_eq!(task.conversation_id, None);
    }

    #[test]
    fn test_update_clears_and_relinks() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        let first = db.create_conversation(user.id, Platform::Web, "v1", None).unwrap();
        let second = db.create_conversation(user.id, Platform::Web, "v2", None).unwrap();

        let mut req = request("Follow up");
        req.description = Some("Call before noon".into());
        req.due_date = NaiveDate::from_ymd_opt(2030, 5, 1);
        req.conversation_id = Some(first.id);
        let task = db.create_task(user.id, &req).unwrap();

        let relinked = db
            .update_task(user.id, task.id, &UpdateTaskRequest {
                conversation_id: Some(Some(second.id)),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(relinked.conversation_id, Some(second.id));
        assert_eq!(relinked.description.as_deref(), Some("Call before noon"));
        assert!(relinked.due_date.is_some());

        let cleared = db
            .update_task(user.id, task.id, &UpdateTaskRequest {
                description: Some(None),
                due_date: Some(None),
                conversation_id: Some(None),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(cleared.description, None);
        assert_eq!(cleared.due_date, None);
        assert_eq!(cleared.conversation_id, None);
        assert_eq!(cleared.title, "Follow up");
    }
}
