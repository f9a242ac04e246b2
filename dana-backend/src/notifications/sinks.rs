use async_trait::async_trait;
use chrono::Utc;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde_json::json;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use super::{NotifyError, RenderedNotification};
use crate::config::SmtpSettings;
use crate::integrations::email::{build_message, smtp_transport};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &RenderedNotification) -> Result<(), NotifyError>;
}

/// Mails notifications to the operator address through the configured SMTP relay
pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    to: String,
}

impl EmailSink {
    pub fn new(smtp: &SmtpSettings, to: &str) -> Result<Self, NotifyError> {
        let transport = smtp_transport(&smtp.host, smtp.port, smtp.username.as_deref(), smtp.password.as_deref())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(Self { transport, from: smtp.from.clone(), to: to.to_string() })
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, notification: &RenderedNotification) -> Result<(), NotifyError> {
        let message = build_message(&self.from, &self.to, &notification.subject, &notification.body)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(())
    }
}

/// Posts to a Slack incoming webhook
pub struct SlackWebhookSink {
    http: reqwest::Client,
    url: String,
}

impl SlackWebhookSink {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl NotificationSink for SlackWebhookSink {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, notification: &RenderedNotification) -> Result<(), NotifyError> {
        let payload = json!({ "text": format!("*{}*\n{}", notification.subject, notification.body) });
        let resp = self.http.post(&self.url).json(&payload).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("Slack webhook returned {}: {}", status, body)));
        }
        Ok(())
    }
}

/// Appends one line per notification to a local log file
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl NotificationSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn send(&self, notification: &RenderedNotification) -> Result<(), NotifyError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = format!(
            "{} [{}] {} | {}\n",
            Utc::now().to_rfc3339(),
            notification.level,
            notification.subject,
            notification.body.replace('\n', " ")
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationLevel;

    #[tokio::test]
    async fn test_file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("nested").join("notify.log"));
        let notification = RenderedNotification {
            subject: "Subject".to_string(),
            body: "line one\nline two".to_string(),
            level: NotificationLevel::Warning,
        };
        sink.send(&notification).await.unwrap();
        sink.send(&notification).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("nested").join("notify.log")).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[warning] Subject | line one line two"));
    }

    #[tokio::test]
    async fn test_slack_sink_reports_connection_errors() {
        let sink = SlackWebhookSink::new(reqwest::Client::new(), "http://127.0.0.1:9/hook".to_string());
        let notification = RenderedNotification {
            subject: "s".to_string(),
            body: "b".to_string(),
            level: NotificationLevel::Info,
        };
        assert!(matches!(sink.send(&notification).await, Err(NotifyError::Http(_))));
    }
}
