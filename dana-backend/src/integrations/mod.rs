//! Third-party integration adapters
//!
//! Every vendor a tenant can connect is an `IntegrationAdapter`. Adapters
//! declare the config fields they need, validate submitted configs against
//! that schema, and talk to the vendor for connection tests, syncs and (for
//! messaging platforms) reply delivery.

pub mod email;
pub mod google_analytics;
pub mod hubspot;
pub mod meta;
pub mod salesforce;
pub mod shopify;
pub mod slack;
pub mod zendesk;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;

use crate::models::IntegrationKind;

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{0}")]
    InvalidConfig(String),
    #[error("{service} error: {message}")]
    Vendor { service: &'static str, message: String },
    #[error("{0} does not support sending messages")]
    Unsupported(IntegrationKind),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl IntegrationError {
    pub fn vendor(service: &'static str, message: impl Into<String>) -> Self {
        IntegrationError::Vendor { service, message: message.into() }
    }

    /// Config problems are the caller's fault, everything else is upstream
    pub fn is_client_error(&self) -> bool {
        matches!(self, IntegrationError::InvalidConfig(_) | IntegrationError::Unsupported(_))
    }
}

/// Format check applied to a config field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Email,
    Port,
    Url,
    ShopDomain,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub secret: bool,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn required(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self { name, label, required: true, secret: false, kind }
    }

    pub const fn optional(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self { name, label, required: false, secret: false, kind }
    }

    pub const fn secret(name: &'static str, label: &'static str) -> Self {
        Self { name, label, required: true, secret: true, kind: FieldKind::Text }
    }
}

/// Result of a vendor sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub records: u64,
    pub details: Value,
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static SHOP_DOMAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*\.myshopify\.com$").expect("valid shop regex"));

/// Config value as a string; numbers are accepted for convenience (ports)
pub fn field_value(config: &Map<String, Value>, name: &str) -> Option<String> {
    match config.get(name)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Required config value, or an InvalidConfig error naming the field
pub fn require_field(config: &Map<String, Value>, name: &str) -> Result<String, IntegrationError> {
    field_value(config, name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IntegrationError::InvalidConfig(format!("Missing required field '{}'", name)))
}

fn check_format(spec: &FieldSpec, value: &str) -> Result<(), IntegrationError> {
    let ok = match spec.kind {
        FieldKind::Text => true,
        FieldKind::Email => EMAIL_RE.is_match(value),
        FieldKind::Port => value.parse::<u16>().map(|p| p > 0).unwrap_or(false),
        FieldKind::Url => url::Url::parse(value)
            .map(|u| u.scheme() == "https" && u.host_str().is_some())
            .unwrap_or(false),
        FieldKind::ShopDomain => SHOP_DOMAIN_RE.is_match(&value.to_lowercase()),
    };
    if ok {
        Ok(())
    } else {
        let expected = match spec.kind {
            FieldKind::Text => "text",
            FieldKind::Email => "an email address",
            FieldKind::Port => "a port number between 1 and 65535",
            FieldKind::Url => "an https:// URL",
            FieldKind::ShopDomain => "a <shop>.myshopify.com domain",
        };
        Err(IntegrationError::InvalidConfig(format!("Field '{}' must be {}", spec.name, expected)))
    }
}

/// Check a submitted config against a field schema
pub fn validate_against_schema(schema: &[FieldSpec], config: &Map<String, Value>) -> Result<(), IntegrationError> {
    for key in config.keys() {
        if !schema.iter().any(|f| f.name == key) {
            return Err(IntegrationError::InvalidConfig(format!("Unknown field '{}'", key)));
        }
    }

    for spec in schema {
        let raw = match config.get(spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    return Err(IntegrationError::InvalidConfig(format!(
                        "Missing required field '{}'",
                        spec.name
                    )));
                }
                continue;
            }
            Some(v) => v,
        };

        let value = match raw {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) if spec.kind == FieldKind::Port => n.to_string(),
            _ => {
                return Err(IntegrationError::InvalidConfig(format!(
                    "Field '{}' must be a string",
                    spec.name
                )));
            }
        };

        if value.is_empty() {
            return Err(IntegrationError::InvalidConfig(format!("Field '{}' cannot be empty", spec.name)));
        }
        check_format(spec, &value)?;
    }

    Ok(())
}

/// Copy of a config with every secret field replaced by a mask
pub fn mask_secrets(schema: &[FieldSpec], config: &Map<String, Value>) -> Map<String, Value> {
    config
        .iter()
        .map(|(key, value)| {
            let secret = schema.iter().any(|f| f.name == key && f.secret);
            let shown = if secret {
                match value.as_str() {
                    Some(s) if s.chars().count() > 8 => {
                        let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
                        Value::String(format!("********{}", tail))
                    }
                    _ => Value::String("********".to_string()),
                }
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

/// Turn a non-2xx vendor response into a Vendor error, otherwise parse its JSON body
pub(crate) async fn vendor_json(service: &'static str, resp: reqwest::Response) -> Result<Value, IntegrationError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(300).collect();
        return Err(IntegrationError::vendor(service, format!("HTTP {}: {}", status.as_u16(), snippet)));
    }
    Ok(resp.json::<Value>().await?)
}

#[async_trait]
pub trait IntegrationAdapter: Send + Sync {
    fn kind(&self) -> IntegrationKind;

    fn display_name(&self) -> &'static str;

    fn config_schema(&self) -> &'static [FieldSpec];

    fn validate(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        validate_against_schema(self.config_schema(), config)
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError>;

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError>;

    /// Whether `send_reply` can deliver agent messages
    fn supports_replies(&self) -> bool {
        false
    }

    async fn send_reply(
        &self,
        _config: &Map<String, Value>,
        _recipient: &str,
        _text: &str,
    ) -> Result<(), IntegrationError> {
        Err(IntegrationError::Unsupported(self.kind()))
    }
}

pub struct IntegrationRegistry {
    adapters: HashMap<IntegrationKind, Arc<dyn IntegrationAdapter>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self { adapters: HashMap::new() }
    }

    pub fn register(&mut self, adapter: Arc<dyn IntegrationAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: IntegrationKind) -> Option<Arc<dyn IntegrationAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// Registered adapters in `IntegrationKind` declaration order
    pub fn all(&self) -> Vec<Arc<dyn IntegrationAdapter>> {
        IntegrationKind::iter().filter_map(|k| self.get(k)).collect()
    }
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared HTTP client for vendor calls
pub fn vendor_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("dana-backend/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

fn register_all_adapters(registry: &mut IntegrationRegistry, http: reqwest::Client) {
    // Business tools
    registry.register(Arc::new(slack::SlackAdapter::new(http.clone())));
    registry.register(Arc::new(email::EmailAdapter));
    registry.register(Arc::new(hubspot::HubspotAdapter::new(http.clone())));
    registry.register(Arc::new(salesforce::SalesforceAdapter::new(http.clone())));
    registry.register(Arc::new(zendesk::ZendeskAdapter::new(http.clone())));
    registry.register(Arc::new(google_analytics::GoogleAnalyticsAdapter::new(http.clone())));
    registry.register(Arc::new(shopify::ShopifyAdapter::new(http.clone())));

    // Social messaging (Meta Graph API)
    registry.register(Arc::new(meta::MetaAdapter::new(IntegrationKind::Facebook, http.clone())));
    registry.register(Arc::new(meta::MetaAdapter::new(IntegrationKind::Instagram, http.clone())));
    registry.register(Arc::new(meta::MetaAdapter::new(IntegrationKind::Whatsapp, http)));
}

/// Create a registry with an adapter for every integration kind
pub fn create_default_registry(http: reqwest::Client) -> IntegrationRegistry {
    let mut registry = IntegrationRegistry::new();
    register_all_adapters(&mut registry, http);
    registry
}
