use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::middleware::session_auth::require_user;
use crate::models::{CreateTaskRequest, TaskStatus, UpdateTaskRequest};
use crate::AppState;

use super::{bad_request, db_error, not_found};

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/tasks")
            .route("", web::get().to(list_tasks))
            .route("", web::post().to(create_task))
            .route("/{id}", web::get().to(get_task))
            .route("/{id}", web::put().to(update_task))
            .route("/{id}", web::delete().to(delete_task)),
    );
}

async fn list_tasks(state: web::Data<AppState>, req: HttpRequest, query: web::Query<TaskQuery>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.list_tasks(user.id, query.status) {
        Ok(tasks) => HttpResponse::Ok().json(tasks),
        Err(e) => db_error("Failed to list tasks", e),
    }
}

async fn create_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateTaskRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if body.title.trim().is_empty() {
        return bad_request("title is required");
    }

    // A linked conversation has to belong to the same account
    if let Some(conversation_id) = body.conversation_id {
        match state.db.get_conversation(user.id, conversation_id) {
            Ok(Some(_)) => {}
            Ok(None) => return not_found("Conversation"),
            Err(e) => return db_error("Failed to get conversation", e),
        }
    }

    match state.db.create_task(user.id, &body) {
        Ok(task) => HttpResponse::Created().json(task),
        Err(e) => db_error("Failed to create task", e),
    }
}

async fn get_task(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.get_task(user.id, path.into_inner()) {
        Ok(Some(task)) => HttpResponse::Ok().json(task),
        Ok(None) => not_found("Task"),
        Err(e) => db_error("Failed to get task", e),
    }
}

async fn update_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateTaskRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if body.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return bad_request("title cannot be empty");
    }
    if let Some(Some(conversation_id)) = body.conversation_id {
        match state.db.get_conversation(user.id, conversation_id) {
            Ok(Some(_)) => {}
            Ok(None) => return not_found("Conversation"),
            Err(e) => return db_error("Failed to get conversation", e),
        }
    }
    match state.db.update_task(user.id, path.into_inner(), &body) {
        Ok(Some(task)) => HttpResponse::Ok().json(task),
        Ok(None) => not_found("Task"),
        Err(e) => db_error("Failed to update task", e),
    }
}

async fn delete_task(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.delete_task(user.id, path.into_inner()) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Ok(false) => not_found("Task"),
        Err(e) => db_error("Failed to delete task", e),
    }
}
