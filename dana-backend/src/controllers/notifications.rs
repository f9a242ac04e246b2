use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::middleware::session_auth::require_user;
use crate::AppState;

use super::{db_error, not_found};

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/notifications")
            .route("", web::get().to(list_notifications))
            .route("/unread_count", web::get().to(unread_count))
            .route("/read_all", web::put().to(mark_all_read))
            .route("/{id}/read", web::put().to(mark_read))
            .route("/{id}", web::delete().to(delete_notification)),
    );
}

async fn list_notifications(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<NotificationQuery>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    match state.db.list_notifications(user.id, query.unread_only, limit) {
        Ok(notifications) => HttpResponse::Ok().json(notifications),
        Err(e) => db_error("Failed to list notifications", e),
    }
}

async fn unread_count(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.count_unread_notifications(user.id) {
        Ok(count) => HttpResponse::Ok().json(serde_json::json!({ "unread": count })),
        Err(e) => db_error("Failed to count notifications", e),
    }
}

async fn mark_read(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.mark_notification_read(user.id, path.into_inner()) {
        Ok(Some(notification)) => HttpResponse::Ok().json(notification),
        Ok(None) => not_found("Notification"),
        Err(e) => db_error("Failed to update notification", e),
    }
}

async fn mark_all_read(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.mark_all_notifications_read(user.id) {
        Ok(updated) => HttpResponse::Ok().json(serde_json::json!({ "updated": updated })),
        Err(e) => db_error("Failed to update notifications", e),
    }
}

async fn delete_notification(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.delete_notification(user.id, path.into_inner()) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Ok(false) => not_found("Notification"),
        Err(e) => db_error("Failed to delete notification", e),
    }
}
