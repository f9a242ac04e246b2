// Session authentication helpers
// Controllers call these at the top of every protected handler to resolve the
// bearer token into the acting user, or get back the error response to return.

use actix_web::{HttpRequest, HttpResponse};

use crate::db::Database;
use crate::models::User;

pub fn extract_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the authenticated, active user behind the request
pub fn require_user(db: &Database, req: &HttpRequest) -> Result<User, HttpResponse> {
    let token = extract_token(req).ok_or_else(|| {
        HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "No authorization token provided"
        }))
    })?;

    match db.get_session_user(&token) {
        Ok(Some(user)) if user.is_active => Ok(user),
        Ok(Some(_)) => Err(HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Account is deactivated"
        }))),
        Ok(None) => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Invalid or expired session"
        }))),
        Err(e) => {
            log::error!("Session validation error: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            })))
        }
    }
}

/// Like `require_user`, but only admins get through
pub fn require_admin(db: &Database, req: &HttpRequest) -> Result<User, HttpResponse> {
    let user = require_user(db, req)?;
    if !user.is_admin() {
        return Err(HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Admin access required"
        })));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;
    use crate::models::AdminUpdateUserRequest;

    #[test]
    fn test_extract_token() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc123"))
            .to_http_request();
        assert_eq!(extract_token(&req).as_deref(), Some("abc123"));

        let req = TestRequest::default().insert_header(("Authorization", "Bearer ")).to_http_request();
        assert!(extract_token(&req).is_none());

        let req = TestRequest::default().to_http_request();
        assert!(extract_token(&req).is_none());
    }

    #[test]
    fn test_require_user_and_admin() {
        let db = Database::new(":memory:").unwrap();
        let admin = db.create_user("admin@example.com", "hash", None).unwrap();
        let user = db.create_user("user@example.com", "hash", None).unwrap();
        let admin_token = db.create_session(admin.id, 1).unwrap().token;
        let user_token = db.create_session(user.id, 1).unwrap().token;

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", user_token)))
            .to_http_request();
        assert_eq!(require_user(&db, &req).unwrap().id, user.id);
        assert_eq!(require_admin(&db, &req).unwrap_err().status(), StatusCode::FORBIDDEN);

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", admin_token)))
            .to_http_request();
        assert_eq!(require_admin(&db, &req).unwrap().id, admin.id);

        let req = TestRequest::default().insert_header(("Authorization", "Bearer nope")).to_http_request();
        assert_eq!(require_user(&db, &req).unwrap_err().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_deactivated_user_forbidden() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        let token = db.create_session(user.id, 1).unwrap().token;
        db.admin_update_user(user.id, &AdminUpdateUserRequest { is_active: Some(false), ..Default::default() })
            .unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();
        assert_eq!(require_user(&db, &req).unwrap_err().status(), StatusCode::FORBIDDEN);
    }
}
