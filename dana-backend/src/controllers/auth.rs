use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::middleware::session_auth::{extract_token, require_user};
use crate::models::{LoginRequest, RegisterRequest, User};
use crate::security::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::AppState;

use super::{bad_request, db_error, is_constraint_violation};

#[derive(Serialize)]
pub struct AuthResponse {
    token: String,
    expires_at: DateTime<Utc>,
    user: User,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    success: bool,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    valid: bool,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/validate", web::get().to(validate))
            .route("/me", web::get().to(me)),
    );
}

fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Some(email),
        _ => None,
    }
}

fn issue_session(state: &web::Data<AppState>, user: User, status: actix_web::http::StatusCode) -> HttpResponse {
    match state.db.create_session(user.id, state.config.session_ttl_hours) {
        Ok(session) => HttpResponse::build(status).json(AuthResponse {
            token: session.token,
            expires_at: session.expires_at,
            user,
        }),
        Err(e) => db_error("Failed to create session", e),
    }
}

async fn register(state: web::Data<AppState>, body: web::Json<RegisterRequest>) -> impl Responder {
    let Some(email) = normalize_email(&body.email) else {
        return bad_request("A valid email address is required");
    };
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return bad_request(format!("Password must be at least {} characters", MIN_PASSWORD_LEN));
    }

    let password_hash = match hash_password(&body.password) {
        Ok(hash) => hash,
        Err(e) => {
            log::error!("{}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to create account"
            }));
        }
    };

    let name = body.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    match state.db.create_user(&email, &password_hash, name) {
        Ok(user) => {
            log::info!("Registered user {} ({})", user.id, user.role);
            issue_session(&state, user, actix_web::http::StatusCode::CREATED)
        }
        Err(e) if is_constraint_violation(&e) => HttpResponse::Conflict().json(serde_json::json!({
            "error": "An account with this email already exists"
        })),
        Err(e) => db_error("Failed to create user", e),
    }
}

async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let invalid = || {
        HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Invalid email or password"
        }))
    };

    let email = body.email.trim().to_lowercase();
    let user = match state.db.get_user_by_email(&email) {
        Ok(Some(user)) => user,
        Ok(None) => return invalid(),
        Err(e) => return db_error("Failed to look up user", e),
    };

    if !verify_password(&body.password, &user.password_hash) {
        return invalid();
    }
    if !user.is_active {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Account is deactivated"
        }));
    }

    issue_session(&state, user, actix_web::http::StatusCode::OK)
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let Some(token) = extract_token(&req) else {
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "No authorization token provided"
        }));
    };

    match state.db.delete_session(&token) {
        Ok(_) => HttpResponse::Ok().json(LogoutResponse { success: true }),
        Err(e) => db_error("Failed to delete session", e),
    }
}

async fn validate(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let valid = match extract_token(&req) {
        Some(token) => match state.db.get_session_user(&token) {
            Ok(user) => user.is_some_and(|u| u.is_active),
            Err(e) => return db_error("Failed to validate session", e),
        },
        None => false,
    };
    HttpResponse::Ok().json(ValidateResponse { valid })
}

async fn me(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    match require_user(&state.db, &req) {
        Ok(user) => HttpResponse::Ok().json(user),
        Err(resp) => resp,
    }
}
