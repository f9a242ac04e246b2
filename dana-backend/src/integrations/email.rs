//! Email integration: SMTP for outbound mail, IMAP reachability for the inbox

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::net::TcpStream;

use super::{field_value, require_field, FieldKind, FieldSpec, IntegrationAdapter, IntegrationError, SyncSummary};
use crate::models::IntegrationKind;

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::required("smtp_host", "SMTP host", FieldKind::Text),
    FieldSpec::required("smtp_port", "SMTP port", FieldKind::Port),
    FieldSpec::required("username", "Username", FieldKind::Text),
    FieldSpec::secret("password", "Password"),
    FieldSpec::required("from_address", "From address", FieldKind::Email),
    FieldSpec::optional("imap_host", "IMAP host", FieldKind::Text),
    FieldSpec::optional("imap_port", "IMAP port", FieldKind::Port),
];

const DEFAULT_IMAP_PORT: u16 = 993;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build an SMTP transport: implicit TLS on 465, plaintext on local relay ports, STARTTLS otherwise
pub fn smtp_transport(
    host: &str,
    port: u16,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, lettre::transport::smtp::Error> {
    let builder = match port {
        465 => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
        25 | 1025 => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
    };

    let builder = builder.port(port).timeout(Some(CONNECT_TIMEOUT));
    let builder = match (username, password) {
        (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.to_string(), pass.to_string())),
        _ => builder,
    };
    Ok(builder.build())
}

/// Build a plain-text message
pub fn build_message(from: &str, to: &str, subject: &str, body: &str) -> Result<Message, IntegrationError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| IntegrationError::InvalidConfig(format!("Invalid sender address: {}", e)))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| IntegrationError::InvalidConfig(format!("Invalid recipient address: {}", e)))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| IntegrationError::InvalidConfig(format!("Invalid message: {}", e)))
}

fn transport_for(config: &Map<String, Value>) -> Result<AsyncSmtpTransport<Tokio1Executor>, IntegrationError> {
    let host = require_field(config, "smtp_host")?;
    let port: u16 = require_field(config, "smtp_port")?
        .parse()
        .map_err(|_| IntegrationError::InvalidConfig("Field 'smtp_port' must be a port number".to_string()))?;
    let username = require_field(config, "username")?;
    let password = require_field(config, "password")?;

    smtp_transport(&host, port, Some(&username), Some(&password))
        .map_err(|e| IntegrationError::vendor("SMTP", e.to_string()))
}

/// Send one message through the tenant's SMTP settings
pub async fn send_email(config: &Map<String, Value>, to: &str, subject: &str, body: &str) -> Result<(), IntegrationError> {
    let from = require_field(config, "from_address")?;
    let message = build_message(&from, to, subject, body)?;
    let transport = transport_for(config)?;

    transport
        .send(message)
        .await
        .map_err(|e| IntegrationError::vendor("SMTP", e.to_string()))?;
    log::info!("[INTEGRATION] Email sent to {}", to);
    Ok(())
}

async fn check_imap(config: &Map<String, Value>) -> Result<Option<String>, IntegrationError> {
    let Some(host) = field_value(config, "imap_host").filter(|h| !h.is_empty()) else {
        return Ok(None);
    };
    let port = field_value(config, "imap_port")
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_IMAP_PORT);
    let address = format!("{}:{}", host, port);

    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&address)).await {
        Ok(Ok(_)) => Ok(Some(address)),
        Ok(Err(e)) => Err(IntegrationError::vendor("IMAP", format!("{} unreachable: {}", address, e))),
        Err(_) => Err(IntegrationError::vendor("IMAP", format!("{} timed out", address))),
    }
}

pub struct EmailAdapter;

#[async_trait]
impl IntegrationAdapter for EmailAdapter {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Email
    }

    fn display_name(&self) -> &'static str {
        "Email (IMAP/SMTP)"
    }

    fn config_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }

    async fn test_connection(&self, config: &Map<String, Value>) -> Result<(), IntegrationError> {
        let transport = transport_for(config)?;
        let ok = transport
            .test_connection()
            .await
            .map_err(|e| IntegrationError::vendor("SMTP", e.to_string()))?;
        if !ok {
            return Err(IntegrationError::vendor("SMTP", "server rejected the connection"));
        }
        check_imap(config).await?;
        Ok(())
    }

    async fn sync(&self, config: &Map<String, Value>) -> Result<SyncSummary, IntegrationError> {
        let imap = check_imap(config).await?;
        Ok(SyncSummary {
            records: 0,
            details: json!({ "imap": imap.map(|a| format!("{} reachable", a)).unwrap_or_else(|| "not configured".to_string()) }),
        })
    }
}
