use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::Platform;

/// Every third-party system a tenant can connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegrationKind {
    Slack,
    Email,
    Hubspot,
    Salesforce,
    Zendesk,
    GoogleAnalytics,
    Shopify,
    Facebook,
    Instagram,
    Whatsapp,
}

impl IntegrationKind {
    /// Integration that can deliver agent replies for conversations on `platform`
    pub fn for_platform(platform: Platform) -> Option<Self> {
        match platform {
            Platform::Facebook => Some(Self::Facebook),
            Platform::Instagram => Some(Self::Instagram),
            Platform::Whatsapp => Some(Self::Whatsapp),
            Platform::Slack => Some(Self::Slack),
            Platform::Email => Some(Self::Email),
            Platform::Web => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegrationStatus {
    Active,
    Error,
}

/// Stored connection settings for one integration of one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub id: i64,
    pub user_id: i64,
    pub kind: IntegrationKind,
    pub config: Map<String, Value>,
    pub status: IntegrationStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationConfig {
    /// String value of a config field, if present
    pub fn field(&self, name: &str) -> Option<&str> {
        self.config.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectIntegrationRequest {
    pub config: Map<String, Value>,
}
