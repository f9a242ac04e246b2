use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{require_field, vendor_json, FieldSpec, IntegrationAdapter, IntegrationError, SyncSummary};
use crate::models::IntegrationKind;

const HUBSPOT_API: &str = "https://api.hubapi.com";

const SCHEMA: &[FieldSpec] = &[FieldSpec::secret("access_token", "Private app access token")];

/// HubSpot CRM v3 adapter
pub struct HubspotAdapter {
    http: reqwest::Client,
}

impl HubspotAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn contacts(&self, config: &Map<String, Value>, limit: u32) -> Result<Value, IntegrationError> {
        let token = require_field(config, "access_token")?;
        let resp = self
            .http
            .get(format!("{}/crm/v3/objects/contacts", HUBSPOT_API))
            .query(&[("limit", limit.to_string()), ("properties", "email,firstname,lastname".to_string())])
            .bearer_auth(token)
            .send()
            .await?;
        vendor_json("HubSpot", resp).await
    }
}

#[async_trait]
impl IntegrationAdapter for HubspotAdapter {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Hubspot
    }

    fn display_name(&self) -> &'static str {
        "HubSpot"
    }

    fn config_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        self.contacts(config, 1).await.map(|_| ())
    }

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError> {
        let page = self.contacts(config, 100).await?;
        let records = page.get("results").and_then(Value::as_array).map_or(0, |r| r.len()) as u64;
        let has_more = page.pointer("/paging/next/after").is_some();

        Ok(SyncSummary {
            records,
            details: json!({ "object": "contacts", "has_more": has_more }),
        })
    }
}
