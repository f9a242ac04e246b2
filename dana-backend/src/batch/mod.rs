//! Background export jobs
//!
//! Jobs are created `pending` by the API and handed to `BatchRunner::submit`,
//! which runs each one on its own tokio task. The database row is the source
//! of truth for job state; the runner only tracks join handles so a cancel
//! can abort work that is still in flight.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::db::{ConversationFilter, Database};
use crate::models::{BatchJob, ConversationWithMessages, JobStatus, JobType, NotificationLevel};
use crate::notifications::{NotificationDispatcher, NotificationEvent};

pub struct BatchRunner {
    db: Arc<Database>,
    export_dir: PathBuf,
    notifier: Arc<NotificationDispatcher>,
    running: DashMap<i64, JoinHandle<()>>,
}

/// Collect the rows a job exports for one tenant
pub fn collect_export(db: &Database, user_id: i64, job_type: JobType) -> rusqlite::Result<Vec<Value>> {
    let to_value = |v: serde_json::Result<Value>| v.unwrap_or(Value::Null);

    match job_type {
        JobType::ExportConversations => {
            let conversations = db.list_conversations(user_id, &ConversationFilter::default())?;
            let mut items = Vec::with_capacity(conversations.len());
            for conversation in conversations {
                let messages = db.list_messages(conversation.id)?;
                items.push(to_value(serde_json::to_value(ConversationWithMessages { conversation, messages })));
            }
            Ok(items)
        }
        JobType::ExportTasks => Ok(db
            .list_tasks(user_id, None)?
            .into_iter()
            .map(|t| to_value(serde_json::to_value(t)))
            .collect()),
        JobType::ExportKnowledge => Ok(db
            .list_knowledge_files(user_id)?
            .into_iter()
            .map(|f| to_value(serde_json::to_value(f)))
            .collect()),
    }
}

async fn write_export(dir: &Path, job: &BatchJob, items: Vec<Value>) -> Result<(i64, PathBuf), String> {
    let dir = dir.join(job.user_id.to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| format!("Failed to create export directory: {}", e))?;

    let count = items.len() as i64;
    let document = json!({
        "job_id": job.id,
        "job_type": job.job_type,
        "exported_at": Utc::now().to_rfc3339(),
        "item_count": count,
        "items": items,
    });
    let bytes = serde_json::to_vec_pretty(&document).map_err(|e| format!("Failed to encode export: {}", e))?;

    let path = dir.join(format!("job-{}-{}.json", job.id, job.job_type));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| format!("Failed to write export: {}", e))?;
    Ok((count, path))
}

impl BatchRunner {
    pub fn new(db: Arc<Database>, export_dir: PathBuf, notifier: Arc<NotificationDispatcher>) -> Self {
        Self { db, export_dir, notifier, running: DashMap::new() }
    }

    /// Start a pending job in the background
    pub fn submit(self: &Arc<Self>, job: BatchJob) {
        let runner = Arc::clone(self);
        let job_id = job.id;
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            // Hold off until the handle is stored so the removal below always finds it
            let _ = registered_rx.await;
            runner.run(job).await;
            runner.running.remove(&job_id);
        });
        self.running.insert(job_id, handle);
        let _ = registered_tx.send(());
    }

    /// Cancel a live job and abort its task; None when the job is not live
    pub fn cancel(&self, user_id: i64, job_id: i64) -> rusqlite::Result<Option<BatchJob>> {
        let cancelled = self.db.cancel_batch_job(user_id, job_id)?;
        if cancelled.is_some() {
            if let Some((_, handle)) = self.running.remove(&job_id) {
                handle.abort();
            }
            log::info!("[BATCH] Job {} cancelled", job_id);
        }
        Ok(cancelled)
    }

    async fn run(&self, job: BatchJob) {
        match self.db.mark_batch_job_running(job.id) {
            Ok(true) => {}
            Ok(false) => {
                log::info!("[BATCH] Job {} is no longer pending, skipping", job.id);
                return;
            }
            Err(e) => {
                log::error!("[BATCH] Failed to start job {}: {}", job.id, e);
                return;
            }
        }
        log::info!("[BATCH] Job {} ({}) started for user {}", job.id, job.job_type, job.user_id);

        let outcome = match collect_export(&self.db, job.user_id, job.job_type) {
            Ok(items) => write_export(&self.export_dir, &job, items).await,
            Err(e) => Err(format!("Failed to read data: {}", e)),
        };

        let (status, item_count, error) = match &outcome {
            Ok((count, path)) => {
                let path = path.to_string_lossy();
                match self.db.finish_batch_job(job.id, Ok((*count, path.as_ref()))) {
                    Ok(true) => (JobStatus::Completed, Some(*count), None),
                    Ok(false) => {
                        let _ = tokio::fs::remove_file(path.as_ref()).await;
                        return;
                    }
                    Err(e) => {
                        log::error!("[BATCH] Failed to record completion of job {}: {}", job.id, e);
                        return;
                    }
                }
            }
            Err(message) => match self.db.finish_batch_job(job.id, Err(message.as_str())) {
                Ok(true) => (JobStatus::Failed, None, Some(message.clone())),
                Ok(false) => return,
                Err(e) => {
                    log::error!("[BATCH] Failed to record failure of job {}: {}", job.id, e);
                    return;
                }
            },
        };

        match status {
            JobStatus::Completed => log::info!("[BATCH] Job {} completed with {} item(s)", job.id, item_count.unwrap_or(0)),
            _ => log::warn!("[BATCH] Job {} failed: {}", job.id, error.as_deref().unwrap_or("unknown error")),
        }

        let event = NotificationEvent::JobStatus {
            job_id: job.id,
            job_type: job.job_type,
            status,
            item_count,
            error,
        };
        let rendered = event.render();
        let level = if status == JobStatus::Completed { NotificationLevel::Success } else { NotificationLevel::Error };
        if let Err(e) = self.db.create_notification(job.user_id, &rendered.subject, &rendered.body, level) {
            log::error!("[BATCH] Failed to store notification for job {}: {}", job.id, e);
        }
        self.notifier.dispatch(&event).await;
    }
}
