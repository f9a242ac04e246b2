use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Platform;

/// Audit record of one inbound webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub platform: Platform,
    pub payload: serde_json::Value,
    pub processed_count: i64,
    pub skipped_count: i64,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
}
