use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{require_field, validate_against_schema, vendor_json, FieldKind, FieldSpec, IntegrationAdapter, IntegrationError, SyncSummary};
use crate::models::IntegrationKind;

const GA_DATA_API: &str = "https://analyticsdata.googleapis.com/v1beta";

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("property_id", "GA4 property ID", FieldKind::Text),
    FieldSpec::secret("access_token", "OAuth access token"),
];

/// Google Analytics Data API (GA4) adapter
pub struct GoogleAnalyticsAdapter {
    http: reqwest::Client,
}

impl GoogleAnalyticsAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn run_report(&self, config: &Map<String, Value>, body: Value) -> Result<Value, IntegrationError> {
        let property = require_field(config, "property_id")?;
        let token = require_field(config, "access_token")?;
        let resp = self
            .http
            .post(format!("{}/properties/{}:runReport", GA_DATA_API, property))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        vendor_json("Google Analytics", resp).await
    }
}

#[async_trait]
impl IntegrationAdapter for GoogleAnalyticsAdapter {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::GoogleAnalytics
    }

    fn display_name(&self) -> &'static str {
        "Google Analytics"
    }

    fn config_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }

    fn validate(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        validate_against_schema(SCHEMA, config)?;
        let property = require_field(config, "property_id")?;
        if !property.chars().all(|c| c.is_ascii_digit()) {
            return Err(IntegrationError::InvalidConfig("Field 'property_id' must be numeric".to_string()));
        }
        Ok(())
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        let body = json!({
            "dateRanges": [{ "startDate": "yesterday", "endDate": "today" }],
            "metrics": [{ "name": "activeUsers" }],
            "limit": 1
        });
        self.run_report(config, body).await.map(|_| ())
    }

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError> {
        let body = json!({
            "dateRanges": [{ "startDate": "30daysAgo", "endDate": "today" }],
            "dimensions": [{ "name": "date" }],
            "metrics": [{ "name": "activeUsers" }, { "name": "sessions" }]
        });
        let report = self.run_report(config, body).await?;

        let rows = report.get("rowCount").and_then(Value::as_u64).unwrap_or(0);
        Ok(SyncSummary {
            records: rows,
            details: json!({ "report": "daily_active_users", "range_days": 30 }),
        })
    }
}
