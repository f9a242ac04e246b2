use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{require_field, vendor_json, FieldKind, FieldSpec, IntegrationAdapter, IntegrationError, SyncSummary};
use crate::models::IntegrationKind;

const API_VERSION: &str = "2024-01";

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("shop_domain", "Shop domain", FieldKind::ShopDomain),
    FieldSpec::secret("access_token", "Admin API access token"),
];

/// Shopify Admin REST adapter
pub struct ShopifyAdapter {
    http: reqwest::Client,
}

impl ShopifyAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn get(&self, config: &Map<String, Value>, path: &str) -> Result<Value, IntegrationError> {
        let shop = require_field(config, "shop_domain")?.to_lowercase();
        let token = require_field(config, "access_token")?;
        let resp = self
            .http
            .get(format!("https://{}/admin/api/{}/{}", shop, API_VERSION, path))
            .header("X-Shopify-Access-Token", token)
            .send()
            .await?;
        vendor_json("Shopify", resp).await
    }
}

#[async_trait]
impl IntegrationAdapter for ShopifyAdapter {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Shopify
    }

    fn display_name(&self) -> &'static str {
        "Shopify"
    }

    fn config_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        let shop = self.get(config, "shop.json").await?;
        log::info!(
            "[INTEGRATION] Shopify connected to {}",
            shop.pointer("/shop/name").and_then(Value::as_str).unwrap_or("?")
        );
        Ok(())
    }

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError> {
        let orders = self.get(config, "orders/count.json?status=any").await?;
        let count = orders.get("count").and_then(Value::as_u64).unwrap_or(0);
        Ok(SyncSummary {
            records: count,
            details: json!({ "object": "orders" }),
        })
    }
}
