use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Default OpenAI-compatible chat completions endpoint for the knowledge analyzer
pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Accepted session lifetimes, one hour up to a year
pub const SESSION_TTL_HOURS_RANGE: RangeInclusive<i64> = 1..=8760;

/// SMTP relay settings shared by the email notification sink
#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub export_dir: PathBuf,
    pub session_ttl_hours: i64,
    pub max_upload_bytes: usize,
    /// Token Meta sends back during webhook subscription verification
    pub meta_verify_token: Option<String>,
    /// App secret used to check X-Hub-Signature headers on webhook deliveries
    pub meta_app_secret: Option<String>,
    pub smtp: Option<SmtpSettings>,
    pub notify_email_to: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub notification_log_path: Option<PathBuf>,
    pub llm_api_key: Option<String>,
    pub llm_endpoint: String,
    pub llm_model: String,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("{} must be a valid number, got '{}'", name, raw)),
        None => Ok(default),
    }
}

fn within<T: PartialOrd + Display>(name: &str, value: T, range: RangeInclusive<T>) -> Result<T, String> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} must be between {} and {}, got {}", name, range.start(), range.end(), value))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let smtp = match optional("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                port: parsed("SMTP_PORT", 587u16)?,
                username: optional("SMTP_USERNAME"),
                password: optional("SMTP_PASSWORD"),
                from: optional("SMTP_FROM").unwrap_or_else(|| format!("Dana AI <noreply@{}>", host)),
                host,
            }),
            None => None,
        };

        Ok(Self {
            port: parsed("PORT", 8080u16)?,
            database_url: optional("DATABASE_URL").unwrap_or_else(|| "./.db/dana.db".to_string()),
            upload_dir: PathBuf::from(optional("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string())),
            export_dir: PathBuf::from(optional("EXPORT_DIR").unwrap_or_else(|| "./exports".to_string())),
            session_ttl_hours: within(
                "SESSION_TTL_HOURS",
                parsed("SESSION_TTL_HOURS", 24i64)?,
                SESSION_TTL_HOURS_RANGE,
            )?,
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 16 * 1024 * 1024usize)?,
            meta_verify_token: optional("META_VERIFY_TOKEN"),
            meta_app_secret: optional("META_APP_SECRET"),
            smtp,
            notify_email_to: optional("NOTIFY_EMAIL_TO"),
            slack_webhook_url: optional("SLACK_WEBHOOK_URL"),
            notification_log_path: optional("NOTIFICATION_LOG_PATH").map(PathBuf::from),
            llm_api_key: optional("LLM_API_KEY"),
            llm_endpoint: optional("LLM_ENDPOINT").unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
            llm_model: optional("LLM_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
        })
    }

    /// Configuration used by unit tests: temp directories, no external sinks
    #[cfg(test)]
    pub fn for_tests(root: &std::path::Path) -> Self {
        Self {
            port: 0,
            database_url: ":memory:".to_string(),
            upload_dir: root.join("uploads"),
            export_dir: root.join("exports"),
            session_ttl_hours: 24,
            max_upload_bytes: 1024 * 1024,
            meta_verify_token: Some("verify-me".to_string()),
            meta_app_secret: None,
            smtp: None,
            notify_email_to: None,
            slack_webhook_url: None,
            notification_log_path: None,
            llm_api_key: None,
            llm_endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            llm_model: "gpt-4o".to_string(),
        }
    }
}
