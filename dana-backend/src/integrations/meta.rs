//! Meta Graph API adapter shared by Facebook Messenger, Instagram and WhatsApp Cloud

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{require_field, vendor_json, FieldKind, FieldSpec, IntegrationAdapter, IntegrationError, SyncSummary};
use crate::models::IntegrationKind;

const GRAPH_API: &str = "https://graph.facebook.com/v18.0";

const PAGE_SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("page_id", "Page ID", FieldKind::Text),
    FieldSpec::secret("access_token", "Page access token"),
];

const WHATSAPP_SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("phone_number_id", "Phone number ID", FieldKind::Text),
    FieldSpec::secret("access_token", "Access token"),
];

/// Config field that ties inbound webhooks to a tenant
pub fn routing_field(kind: IntegrationKind) -> Option<&'static str> {
    match kind {
        IntegrationKind::Facebook | IntegrationKind::Instagram => Some("page_id"),
        IntegrationKind::Whatsapp => Some("phone_number_id"),
        _ => None,
    }
}

pub struct MetaAdapter {
    kind: IntegrationKind,
    http: reqwest::Client,
}

impl MetaAdapter {
    pub fn new(kind: IntegrationKind, http: reqwest::Client) -> Self {
        Self { kind, http }
    }

    /// Page / phone number id, escaped for use as a Graph API path segment
    fn routing_id(&self, config: &Map<String, Value>) -> Result<String, IntegrationError> {
        let field = routing_field(self.kind).ok_or(IntegrationError::Unsupported(self.kind))?;
        let id = require_field(config, field)?;
        Ok(urlencoding::encode(&id).into_owned())
    }

    async fn graph_get(&self, config: &Map<String, Value>, path: &str) -> Result<Value, IntegrationError> {
        let token = require_field(config, "access_token")?;
        let resp = self
            .http
            .get(format!("{}/{}", GRAPH_API, path))
            .bearer_auth(token)
            .send()
            .await?;
        vendor_json("Meta Graph API", resp).await
    }

    fn reply_body(&self, recipient: &str, text: &str) -> Value {
        match self.kind {
            IntegrationKind::Whatsapp => json!({
                "messaging_product": "whatsapp",
                "to": recipient,
                "type": "text",
                "text": { "body": text }
            }),
            _ => json!({
                "recipient": { "id": recipient },
                "message": { "text": text },
                "messaging_type": "RESPONSE"
            }),
        }
    }
}

#[async_trait]
impl IntegrationAdapter for MetaAdapter {
    fn kind(&self) -> IntegrationKind {
        self.kind
    }

    fn display_name(&self) -> &'static str {
        match self.kind {
            IntegrationKind::Instagram => "Instagram",
            IntegrationKind::Whatsapp => "WhatsApp Business",
            _ => "Facebook Messenger",
        }
    }

    fn config_schema(&self) -> &'static [FieldSpec] {
        match self.kind {
            IntegrationKind::Whatsapp => WHATSAPP_SCHEMA,
            _ => PAGE_SCHEMA,
        }
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        let id = self.routing_id(config)?;
        let fields = match self.kind {
            IntegrationKind::Whatsapp => "display_phone_number,verified_name",
            _ => "id,name",
        };
        self.graph_get(config, &format!("{}?fields={}", id, fields)).await.map(|_| ())
    }

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError> {
        let id = self.routing_id(config)?;
        match self.kind {
            IntegrationKind::Whatsapp => {
                let info = self
                    .graph_get(config, &format!("{}?fields=display_phone_number,verified_name,quality_rating", id))
                    .await?;
                Ok(SyncSummary { records: 0, details: info })
            }
            _ => {
                let platform = if self.kind == IntegrationKind::Instagram { "instagram" } else { "messenger" };
                let page = self
                    .graph_get(config, &format!("{}/conversations?platform={}&limit=100", id, platform))
                    .await?;
                let records = page.get("data").and_then(Value::as_array).map_or(0, |d| d.len()) as u64;
                Ok(SyncSummary {
                    records,
                    details: json!({ "object": "conversations", "platform": platform }),
                })
            }
        }
    }

    fn supports_replies(&self) -> bool {
        true
    }

    async fn send_reply(&self, config: &Map<String, Value>, recipient: &str, text: &str) -> Result<(), IntegrationError> {
        let id = self.routing_id(config)?;
        let token = require_field(config, "access_token")?;
        let resp = self
            .http
            .post(format!("{}/{}/messages", GRAPH_API, id))
            .bearer_auth(token)
            .json(&self.reply_body(recipient, text))
            .send()
            .await?;
        vendor_json("Meta Graph API", resp).await?;
        log::info!("[INTEGRATION] Delivered {} reply to {}", self.kind, recipient);
        Ok(())
    }
}
