use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{field_value, require_field, vendor_json, FieldKind, FieldSpec, IntegrationAdapter, IntegrationError, SyncSummary};
use crate::models::IntegrationKind;

const DEFAULT_API_VERSION: &str = "v59.0";
const CONTACT_QUERY: &str = "SELECT Id, Name, Email FROM Contact ORDER BY LastModifiedDate DESC LIMIT 200";

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("instance_url", "Instance URL", FieldKind::Url),
    FieldSpec::secret("access_token", "Access token"),
    FieldSpec::optional("api_version", "API version", FieldKind::Text),
];

/// Salesforce REST adapter
pub struct SalesforceAdapter {
    http: reqwest::Client,
}

impl SalesforceAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn data_url(config: &Map<String, Value>, path: &str) -> Result<String, IntegrationError> {
        let instance = require_field(config, "instance_url")?;
        let version = field_value(config, "api_version")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        Ok(format!("{}/services/data/{}/{}", instance.trim_end_matches('/'), version, path))
    }
}

#[async_trait]
impl IntegrationAdapter for SalesforceAdapter {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Salesforce
    }

    fn display_name(&self) -> &'static str {
        "Salesforce"
    }

    fn config_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        let token = require_field(config, "access_token")?;
        let resp = self
            .http
            .get(Self::data_url(config, "limits")?)
            .bearer_auth(token)
            .send()
            .await?;
        vendor_json("Salesforce", resp).await.map(|_| ())
    }

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError> {
        let token = require_field(config, "access_token")?;
        let resp = self
            .http
            .get(Self::data_url(config, "query")?)
            .query(&[("q", CONTACT_QUERY)])
            .bearer_auth(token)
            .send()
            .await?;
        let result = vendor_json("Salesforce", resp).await?;

        let records = result.get("totalSize").and_then(Value::as_u64).unwrap_or(0);
        Ok(SyncSummary {
            records,
            details: json!({ "object": "Contact", "done": result.get("done") }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url() {
        let config = json!({"instance_url": "https://acme.my.salesforce.com/", "access_token": "t"});
        let url = SalesforceAdapter::data_url(config.as_object().unwrap(), "limits").unwrap();
        assert_eq!(url, "https://acme.my.salesforce.com/services/data/v59.0/limits");

        let config = json!({"instance_url": "https://acme.my.salesforce.com", "api_version": "v60.0"});
        let url = SalesforceAdapter::data_url(config.as_object().unwrap(), "query").unwrap();
        assert!(url.ends_with("/v60.0/query"));
    }
}
