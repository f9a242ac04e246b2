//! Batch job database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::sqlite::enum_col;
use crate::models::{BatchJob, JobStatus, JobType};
use super::super::Database;

const JOB_COLUMNS: &str =
    "id, user_id, job_type, status, item_count, result_path, error, created_at, started_at, completed_at";

impl Database {
    fn row_to_batch_job(row: &Row) -> SqliteResult<BatchJob> {
        Ok(BatchJob {
            id: row.get(0)?,
            user_id: row.get(1)?,
            job_type: enum_col(row, 2)?,
            status: enum_col(row, 3)?,
            item_count: row.get(4)?,
            result_path: row.get(5)?,
            error: row.get(6)?,
            created_at: row.get(7)?,
            started_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }

    pub fn create_batch_job(&self, user_id: i64, job_type: JobType) -> SqliteResult<BatchJob> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO batch_jobs (user_id, job_type, status, created_at) VALUES (?1, ?2, 'pending', ?3)",
            rusqlite::params![user_id, job_type.as_ref(), &now],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {} FROM batch_jobs WHERE id = ?1", JOB_COLUMNS),
            [id],
            Self::row_to_batch_job,
        )
    }

    pub fn get_batch_job(&self, user_id: i64, id: i64) -> SqliteResult<Option<BatchJob>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM batch_jobs WHERE id = ?1 AND user_id = ?2", JOB_COLUMNS),
            [id, user_id],
            Self::row_to_batch_job,
        )
        .optional()
    }

    pub fn list_batch_jobs(&self, user_id: i64) -> SqliteResult<Vec<BatchJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM batch_jobs WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map([user_id], Self::row_to_batch_job)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(jobs)
    }

    /// pending -> running. False if the job was cancelled before it started.
    pub fn mark_batch_job_running(&self, id: i64) -> SqliteResult<bool> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.lock().execute(
            "UPDATE batch_jobs SET status = 'running', started_at = ?1 WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![&now, id],
        )?;
        Ok(rows > 0)
    }

    /// running -> completed/failed. False if the job was cancelled meanwhile.
    pub fn finish_batch_job(
        &self,
        id: i64,
        outcome: Result<(i64, &str), &str>,
    ) -> SqliteResult<bool> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        let rows = match outcome {
            Ok((item_count, result_path)) => conn.execute(
                "UPDATE batch_jobs SET status = 'completed', item_count = ?1, result_path = ?2, completed_at = ?3
                 WHERE id = ?4 AND status = 'running'",
                rusqlite::params![item_count, result_path, &now, id],
            )?,
            Err(error) => conn.execute(
                "UPDATE batch_jobs SET status = 'failed', error = ?1, completed_at = ?2
                 WHERE id = ?3 AND status = 'running'",
                rusqlite::params![error, &now, id],
            )?,
        };
        Ok(rows > 0)
    }

    /// Cancel a live job; returns the updated job, or None if it was not live
    pub fn cancel_batch_job(&self, user_id: i64, id: i64) -> SqliteResult<Option<BatchJob>> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.lock().execute(
            "UPDATE batch_jobs SET status = ?1, completed_at = ?2
             WHERE id = ?3 AND user_id = ?4 AND status IN ('pending', 'running')",
            rusqlite::params![JobStatus::Cancelled.as_ref(), &now, id, user_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_batch_job(user_id, id)
    }
}
