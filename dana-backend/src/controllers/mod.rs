pub mod admin;
pub mod auth;
pub mod batch;
pub mod conversations;
pub mod dashboard;
pub mod health;
pub mod integrations;
pub mod knowledge;
pub mod notifications;
pub mod profile;
pub mod subscriptions;
pub mod tasks;
pub mod webhooks;

use actix_web::HttpResponse;
use rusqlite::ErrorCode;
use serde::Deserialize;

/// Log a storage failure and answer 500
pub(crate) fn db_error(context: &str, e: rusqlite::Error) -> HttpResponse {
    log::error!("{}: {}", context, e);
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Internal server error"
    }))
}

pub(crate) fn not_found(what: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": format!("{} not found", what)
    }))
}

pub(crate) fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": message.into()
    }))
}

/// UNIQUE / CHECK / FOREIGN KEY failures from SQLite
pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

/// `?days=` window shared by the dashboard endpoints
#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

impl DaysQuery {
    pub const DEFAULT: i64 = 7;
    pub const MAX: i64 = 90;

    /// Requested window, or an error message when it is out of range
    pub fn resolve(&self) -> Result<i64, String> {
        match self.days {
            None => Ok(Self::DEFAULT),
            Some(d) if (1..=Self::MAX).contains(&d) => Ok(d),
            Some(d) => Err(format!("days must be between 1 and {}, got {}", Self::MAX, d)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_query() {
        assert_eq!(DaysQuery { days: None }.resolve(), Ok(7));
        assert_eq!(DaysQuery { days: Some(90) }.resolve(), Ok(90));
        assert!(DaysQuery { days: Some(0) }.resolve().is_err());
        assert!(DaysQuery { days: Some(91) }.resolve().is_err());
    }
}
