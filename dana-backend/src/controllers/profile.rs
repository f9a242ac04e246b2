use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::middleware::session_auth::require_user;
use crate::models::{ChangePasswordRequest, UpdateProfileRequest};
use crate::security::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::AppState;

use super::{bad_request, db_error, not_found};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/profile")
            .route("", web::get().to(get_profile))
            .route("", web::put().to(update_profile))
            .route("/password", web::put().to(change_password)),
    );
}

async fn get_profile(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    match require_user(&state.db, &req) {
        Ok(user) => HttpResponse::Ok().json(user),
        Err(resp) => resp,
    }
}

async fn update_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    // Blank strings clear nothing; treat them as "not provided"
    let clean = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let update = UpdateProfileRequest {
        name: clean(&body.name),
        company: clean(&body.company),
        timezone: clean(&body.timezone),
        avatar_url: clean(&body.avatar_url),
    };

    if let Some(url) = &update.avatar_url {
        if url::Url::parse(url).map(|u| u.scheme() != "https" && u.scheme() != "http").unwrap_or(true) {
            return bad_request("avatar_url must be an http(s) URL");
        }
    }

    match state.db.update_profile(user.id, &update) {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => not_found("User"),
        Err(e) => db_error("Failed to update profile", e),
    }
}

async fn change_password(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ChangePasswordRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    if !verify_password(&body.current_password, &user.password_hash) {
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Current password is incorrect"
        }));
    }
    if body.new_password.chars().count() < MIN_PASSWORD_LEN {
        return bad_request(format!("Password must be at least {} characters", MIN_PASSWORD_LEN));
    }

    let hash = match hash_password(&body.new_password) {
        Ok(hash) => hash,
        Err(e) => {
            log::error!("{}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update password"
            }));
        }
    };

    match state.db.update_password_hash(user.id, &hash) {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => db_error("Failed to update password", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::{bearer, seed_user, test_state};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_update_profile() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (_, token) = seed_user(&state, "a@example.com");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::put()
            .uri("/api/profile")
            .insert_header(bearer(&token))
            .set_json(json!({"company": "Acme", "timezone": "Europe/Berlin", "name": "  "}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["company"], "Acme");
        assert_eq!(body["timezone"], "Europe/Berlin");
        assert_eq!(body["name"], "Test User");

        let req = test::TestRequest::put()
            .uri("/api/profile")
            .insert_header(bearer(&token))
            .set_json(json!({"avatar_url": "javascript:alert(1)"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/profile").insert_header(bearer(&token)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["company"], "Acme");
    }

    #[actix_web::test]
    async fn test_change_password() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let user = state.db.create_user("a@example.com", &hash_password("old-password").unwrap(), None).unwrap();
        let token = state.db.create_session(user.id, 1).unwrap().token;
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::put()
            .uri("/api/profile/password")
            .insert_header(bearer(&token))
            .set_json(json!({"current_password": "nope-nope", "new_password": "new-password"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::put()
            .uri("/api/profile/password")
            .insert_header(bearer(&token))
            .set_json(json!({"current_password": "old-password", "new_password": "new-password"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let stored = state.db.get_user(user.id).unwrap().unwrap();
        assert!(verify_password("new-password", &stored.password_hash));
    }
}
