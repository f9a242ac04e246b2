//! Admin-only user management, broadcasts and security alerts

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::knowledge::remove_upload;
use crate::middleware::session_auth::require_admin;
use crate::models::{AdminUpdateUserRequest, NotificationLevel};
use crate::notifications::{NotificationEvent, VulnerabilityReport};
use crate::AppState;

use super::{bad_request, db_error, not_found};

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
    pub level: Option<NotificationLevel>,
}

// Tier management lives under /api/admin too (see subscriptions), so no scope here
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/admin/users").route(web::get().to(list_users)))
        .service(
            web::resource("/api/admin/users/{id}")
                .route(web::get().to(get_user))
                .route(web::put().to(update_user))
                .route(web::delete().to(delete_user)),
        )
        .service(web::resource("/api/admin/stats").route(web::get().to(stats)))
        .service(web::resource("/api/admin/notifications/broadcast").route(web::post().to(broadcast)))
        .service(web::resource("/api/admin/security/vulnerabilities").route(web::post().to(report_vulnerability)));
}

async fn list_users(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state.db, &req) {
        return resp;
    }
    match state.db.list_users() {
        Ok(users) => HttpResponse::Ok().json(users),
        Err(e) => db_error("Failed to list users", e),
    }
}

async fn get_user(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    if let Err(resp) = require_admin(&state.db, &req) {
        return resp;
    }
    match state.db.get_user(path.into_inner()) {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => not_found("User"),
        Err(e) => db_error("Failed to get user", e),
    }
}

async fn update_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<AdminUpdateUserRequest>,
) -> impl Responder {
    let admin = match require_admin(&state.db, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let id = path.into_inner();

    if id == admin.id && (body.is_active == Some(false) || body.role.is_some_and(|r| r != admin.role)) {
        return bad_request("Admins cannot demote or deactivate themselves");
    }

    match state.db.admin_update_user(id, &body) {
        Ok(Some(user)) => {
            if !user.is_active {
                if let Err(e) = state.db.delete_user_sessions(user.id) {
                    log::error!("Failed to revoke sessions for user {}: {}", user.id, e);
                }
            }
            log::info!("Admin {} updated user {}", admin.id, user.id);
            HttpResponse::Ok().json(user)
        }
        Ok(None) => not_found("User"),
        Err(e) => db_error("Failed to update user", e),
    }
}

async fn delete_user(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let admin = match require_admin(&state.db, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let id = path.into_inner();
    if id == admin.id {
        return bad_request("Admins cannot delete their own account");
    }

    // Rows cascade in the database; stored uploads have to be removed by hand
    let files = match state.db.list_knowledge_files(id) {
        Ok(files) => files,
        Err(e) => return db_error("Failed to list user files", e),
    };

    match state.db.delete_user(id) {
        Ok(true) => {
            for file in files {
                if let Err(e) = remove_upload(&file.stored_path).await {
                    log::warn!("Failed to remove upload {}: {}", file.stored_path, e);
                }
            }
            let exports = state.config.export_dir.join(id.to_string());
            if let Err(e) = tokio::fs::remove_dir_all(&exports).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove exports for user {}: {}", id, e);
                }
            }
            log::info!("Admin {} deleted user {}", admin.id, id);
            HttpResponse::Ok().json(serde_json::json!({ "success": true }))
        }
        Ok(false) => not_found("User"),
        Err(e) => db_error("Failed to delete user", e),
    }
}

async fn stats(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state.db, &req) {
        return resp;
    }
    match state.db.admin_stats() {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => db_error("Failed to compute admin stats", e),
    }
}

async fn broadcast(state: web::Data<AppState>, req: HttpRequest, body: web::Json<BroadcastRequest>) -> impl Responder {
    if let Err(resp) = require_admin(&state.db, &req) {
        return resp;
    }
    let title = body.title.trim();
    let message = body.message.trim();
    if title.is_empty() || message.is_empty() {
        return bad_request("title and message are required");
    }

    let recipients = match state.db.list_active_user_ids(false) {
        Ok(ids) => ids,
        Err(e) => return db_error("Failed to list recipients", e),
    };
    match state
        .db
        .broadcast_notification(&recipients, title, message, body.level.unwrap_or(NotificationLevel::Info))
    {
        Ok(count) => HttpResponse::Ok().json(serde_json::json!({ "recipients": count })),
        Err(e) => db_error("Failed to broadcast notification", e),
    }
}

async fn report_vulnerability(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<VulnerabilityReport>,
) -> impl Responder {
    if let Err(resp) = require_admin(&state.db, &req) {
        return resp;
    }
    let report = body.into_inner();
    if report.package.trim().is_empty() || report.current_version.trim().is_empty() {
        return bad_request("package and current_version are required");
    }

    let event = NotificationEvent::DependencyVulnerability(report);
    let rendered = event.render();

    let admins = match state.db.list_active_user_ids(true) {
        Ok(ids) => ids,
        Err(e) => return db_error("Failed to list admins", e),
    };
    if let Err(e) = state
        .db
        .broadcast_notification(&admins, &rendered.subject, &rendered.body, rendered.level)
    {
        return db_error("Failed to record vulnerability notification", e);
    }

    let deliveries = state.notifier.dispatch(&event).await;
    HttpResponse::Ok().json(serde_json::json!({
        "subject": rendered.subject,
        "notified_admins": admins.len(),
        "deliveries": deliveries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::{bearer, seed_user, test_state};
    use crate::models::Platform;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_non_admin_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_user(&state, "admin@example.com");
        let (_, token) = seed_user(&state, "user@example.com");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        for uri in ["/api/admin/users", "/api/admin/stats"] {
            let req = test::TestRequest::get().uri(uri).insert_header(bearer(&token)).to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
        }
        let req = test::TestRequest::get().uri("/api/admin/users").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_user_management() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (admin, admin_token) = seed_user(&state, "admin@example.com");
        let (user, user_token) = seed_user(&state, "user@example.com");
        state.db.create_conversation(user.id, Platform::Web, "c1", None).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/admin/stats").insert_header(bearer(&admin_token)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["users"], 2);
        assert_eq!(body["conversations"], 1);

        let req = test::TestRequest::put()
            .uri(&format!("/api/admin/users/{}", user.id))
            .insert_header(bearer(&admin_token))
            .set_json(json!({"is_active": false}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["is_active"], false);
        assert!(state.db.get_session_user(&user_token).unwrap().is_none());

        let req = test::TestRequest::delete()
            .uri(&format!("/api/admin/users/{}", admin.id))
            .insert_header(bearer(&admin_token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/admin/users/{}", user.id))
            .insert_header(bearer(&admin_token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(state.db.admin_stats().unwrap().conversations, 0);

        let req = test::TestRequest::get()
            .uri(&format!("/api/admin/users/{}", user.id))
            .insert_header(bearer(&admin_token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_broadcast_and_vulnerability_alert() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (admin, admin_token) = seed_user(&state, "admin@example.com");
        let (user, _) = seed_user(&state, "user@example.com");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/admin/notifications/broadcast")
            .insert_header(bearer(&admin_token))
            .set_json(json!({"title": "Maintenance", "message": "Down at 2am", "level": "warning"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["recipients"], 2);
        assert_eq!(state.db.count_unread_notifications(user.id).unwrap(), 1);

        let req = test::TestRequest::post()
            .uri("/api/admin/security/vulnerabilities")
            .insert_header(bearer(&admin_token))
            .set_json(json!({
                "package": "lodash", "current_version": "4.17.15",
                "fixed_version": "4.17.21", "severity": "high"
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["notified_admins"], 1);
        assert_eq!(body["deliveries"].as_array().unwrap().len(), 0);
        assert_eq!(state.db.count_unread_notifications(admin.id).unwrap(), 2);
        assert_eq!(state.db.count_unread_notifications(user.id).unwrap(), 1);
    }
}
