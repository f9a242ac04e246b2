//! Outbound notification fan-out (email, Slack webhook, log file)
//!
//! The dispatcher renders a `NotificationEvent` once and hands it to every
//! configured sink. Sinks are independent: a failing sink is logged and
//! reported in the results without stopping the rest.

mod sinks;

pub use sinks::{EmailSink, FileSink, NotificationSink, SlackWebhookSink};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::config::Config;
use crate::models::{JobStatus, JobType, NotificationLevel};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sink rejected notification: {0}")]
    Rejected(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Dependency advisory submitted by an admin
#[derive(Debug, Clone, Deserialize)]
pub struct VulnerabilityReport {
    pub package: String,
    pub current_version: String,
    pub fixed_version: Option<String>,
    pub severity: Severity,
    pub advisory_url: Option<String>,
}

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    JobStatus {
        job_id: i64,
        job_type: JobType,
        status: JobStatus,
        item_count: Option<i64>,
        error: Option<String>,
    },
    DependencyVulnerability(VulnerabilityReport),
}

/// Event rendered into the text every sink sends
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNotification {
    pub subject: String,
    pub body: String,
    pub level: NotificationLevel,
}

impl NotificationEvent {
    pub fn render(&self) -> RenderedNotification {
        match self {
            NotificationEvent::JobStatus { job_id, job_type, status, item_count, error } => {
                let level = match status {
                    JobStatus::Completed => NotificationLevel::Success,
                    JobStatus::Failed => NotificationLevel::Error,
                    JobStatus::Cancelled => NotificationLevel::Warning,
                    _ => NotificationLevel::Info,
                };
                let mut body = format!("Batch job #{} ({}) is now {}.", job_id, job_type, status);
                if let Some(count) = item_count {
                    body.push_str(&format!(" {} item(s) exported.", count));
                }
                if let Some(error) = error {
                    body.push_str(&format!(" Error: {}", error));
                }
                RenderedNotification {
                    subject: format!("Job #{} {}", job_id, status),
                    body,
                    level,
                }
            }
            NotificationEvent::DependencyVulnerability(report) => {
                let level = match report.severity {
                    Severity::High | Severity::Critical => NotificationLevel::Error,
                    _ => NotificationLevel::Warning,
                };
                let mut body = format!(
                    "{} severity vulnerability in {} {}.",
                    report.severity, report.package, report.current_version
                );
                match &report.fixed_version {
                    Some(fixed) => body.push_str(&format!(" Upgrade to {} or later.", fixed)),
                    None => body.push_str(" No fixed version is available yet."),
                }
                if let Some(url) = &report.advisory_url {
                    body.push_str(&format!(" Advisory: {}", url));
                }
                RenderedNotification {
                    subject: format!("[{}] Vulnerability in {}", report.severity.as_ref().to_uppercase(), report.package),
                    body,
                    level,
                }
            }
        }
    }
}

/// Outcome of one sink for one dispatch
#[derive(Debug, Clone, Serialize)]
pub struct SinkResult {
    pub sink: &'static str,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct NotificationDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl NotificationDispatcher {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    /// Build every sink the configuration enables
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();

        if let (Some(smtp), Some(to)) = (&config.smtp, &config.notify_email_to) {
            match EmailSink::new(smtp, to) {
                Ok(sink) => sinks.push(Box::new(sink)),
                Err(e) => log::error!("[NOTIFY] Email sink disabled: {}", e),
            }
        }
        if let Some(url) = &config.slack_webhook_url {
            sinks.push(Box::new(SlackWebhookSink::new(http, url.clone())));
        }
        if let Some(path) = &config.notification_log_path {
            sinks.push(Box::new(FileSink::new(path.clone())));
        }

        log::info!("[NOTIFY] {} notification sink(s) configured", sinks.len());
        Self::new(sinks)
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub async fn dispatch(&self, event: &NotificationEvent) -> Vec<SinkResult> {
        let rendered = event.render();
        let mut results = Vec::with_capacity(self.sinks.len());

        for sink in &self.sinks {
            let result = match sink.send(&rendered).await {
                Ok(()) => SinkResult { sink: sink.name(), delivered: true, error: None },
                Err(e) => {
                    log::error!("[NOTIFY] {} sink failed for '{}': {}", sink.name(), rendered.subject, e);
                    SinkResult { sink: sink.name(), delivered: false, error: Some(e.to_string()) }
                }
            };
            results.push(result);
        }
        results
    }
}
