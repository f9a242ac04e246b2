use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{require_field, vendor_json, FieldKind, FieldSpec, IntegrationAdapter, IntegrationError, SyncSummary};
use crate::models::IntegrationKind;

const SLACK_API: &str = "https://slack.com/api";

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::secret("bot_token", "Bot User OAuth Token"),
    FieldSpec::optional("default_channel", "Default channel", FieldKind::Text),
];

/// Slack Web API adapter (bot token auth)
pub struct SlackAdapter {
    http: reqwest::Client,
}

impl SlackAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Call a Web API method; Slack reports failures as `{"ok": false, "error": ...}` with HTTP 200
    async fn call(&self, token: &str, method: &str, body: Option<Value>) -> Result<Value, IntegrationError> {
        let url = format!("{}/{}", SLACK_API, method);
        let request = match body {
            Some(body) => self.http.post(&url).json(&body),
            None => self.http.get(&url),
        };
        let resp = request.bearer_auth(token).send().await?;
        let payload = vendor_json("Slack", resp).await?;

        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = payload.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
            return Err(IntegrationError::vendor("Slack", error));
        }
        Ok(payload)
    }
}

#[async_trait]
impl IntegrationAdapter for SlackAdapter {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Slack
    }

    fn display_name(&self) -> &'static str {
        "Slack"
    }

    fn config_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }

    fn validate(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        super::validate_against_schema(SCHEMA, config)?;
        let token = require_field(config, "bot_token")?;
        if !token.starts_with("xox") {
            return Err(IntegrationError::InvalidConfig(
                "Field 'bot_token' must be a Slack token (xoxb-...)".to_string(),
            ));
        }
        Ok(())
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        let token = require_field(config, "bot_token")?;
        let info = self.call(&token, "auth.test", None).await?;
        log::info!(
            "[INTEGRATION] Slack connected to team {}",
            info.get("team").and_then(Value::as_str).unwrap_or("?")
        );
        Ok(())
    }

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError> {
        let token = require_field(config, "bot_token")?;
        let payload = self
            .call(&token, "conversations.list?limit=200&exclude_archived=true", None)
            .await?;

        let channels: Vec<Value> = payload
            .get("channels")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|c| json!({"id": c.get("id"), "name": c.get("name")}))
                    .collect()
            })
            .unwrap_or_default();

        Ok(SyncSummary {
            records: channels.len() as u64,
            details: json!({ "channels": channels }),
        })
    }

    fn supports_replies(&self) -> bool {
        true
    }

    async fn send_reply(&self, config: &Map<String, Value>, recipient: &str, text: &str) -> Result<(), IntegrationError> {
        let token = require_field(config, "bot_token")?;
        self.call(&token, "chat.postMessage", Some(json!({ "channel": recipient, "text": text })))
            .await?;
        Ok(())
    }
}
