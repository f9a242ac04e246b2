use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{require_field, validate_against_schema, vendor_json, FieldKind, FieldSpec, IntegrationAdapter, IntegrationError, SyncSummary};
use crate::models::IntegrationKind;

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("subdomain", "Zendesk subdomain", FieldKind::Text),
    FieldSpec::required("email", "Agent email", FieldKind::Email),
    FieldSpec::secret("api_token", "API token"),
];

/// Zendesk Support API adapter (email/token basic auth)
pub struct ZendeskAdapter {
    http: reqwest::Client,
}

impl ZendeskAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn get(&self, config: &Map<String, Value>, path: &str) -> Result<Value, IntegrationError> {
        let subdomain = require_field(config, "subdomain")?;
        let email = require_field(config, "email")?;
        let token = require_field(config, "api_token")?;

        let resp = self
            .http
            .get(format!("https://{}.zendesk.com/api/v2/{}", subdomain, path))
            .basic_auth(format!("{}/token", email), Some(token))
            .send()
            .await?;
        vendor_json("Zendesk", resp).await
    }
}

fn valid_subdomain(s: &str) -> bool {
    !s.is_empty() && !s.starts_with('-') && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[async_trait]
impl IntegrationAdapter for ZendeskAdapter {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Zendesk
    }

    fn display_name(&self) -> &'static str {
        "Zendesk"
    }

    fn config_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }

    fn validate(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        validate_against_schema(SCHEMA, config)?;
        if !valid_subdomain(&require_field(config, "subdomain")?) {
            return Err(IntegrationError::InvalidConfig(
                "Field 'subdomain' must contain only letters, digits and hyphens".to_string(),
            ));
        }
        Ok(())
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        self.get(config, "users/me.json").await.map(|_| ())
    }

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError> {
        let page = self.get(config, "tickets.json?per_page=100&sort_by=updated_at&sort_order=desc").await?;
        let tickets = page.get("tickets").and_then(Value::as_array).map_or(0, |t| t.len()) as u64;
        let open = page
            .get("tickets")
            .and_then(Value::as_array)
            .map_or(0, |t| t.iter().filter(|x| x.get("status").and_then(Value::as_str) == Some("open")).count());

        Ok(SyncSummary {
            records: tickets,
            details: json!({ "object": "tickets", "open": open, "total": page.get("count") }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subdomain_rules() {
        let adapter = ZendeskAdapter::new(reqwest::Client::new());
        let good = json!({"subdomain": "acme-support", "email": "a@acme.com", "api_token": "t"});
        assert!(adapter.validate(good.as_object().unwrap()).is_ok());

        let bad = json!({"subdomain": "acme.evil.com/", "email": "a@acme.com", "api_token": "t"});
        assert!(adapter.validate(bad.as_object().unwrap()).is_err());
    }
}
