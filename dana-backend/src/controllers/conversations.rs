use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::analytics::classify_sentiment;
use crate::db::ConversationFilter;
use crate::middleware::session_auth::require_user;
use crate::models::{
    Conversation, ConversationWithMessages, CreateConversationRequest, CreateMessageRequest,
    IntegrationKind, SenderType, UpdateConversationRequest,
};
use crate::AppState;

use super::{bad_request, db_error, is_constraint_violation, not_found};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/conversations")
            .route("", web::get().to(list_conversations))
            .route("", web::post().to(create_conversation))
            .route("/{id}", web::get().to(get_conversation))
            .route("/{id}", web::put().to(update_conversation))
            .route("/{id}", web::delete().to(delete_conversation))
            .route("/{id}/messages", web::get().to(list_messages))
            .route("/{id}/messages", web::post().to(create_message)),
    );
}

async fn list_conversations(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ConversationFilter>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.list_conversations(user.id, &query) {
        Ok(conversations) => HttpResponse::Ok().json(conversations),
        Err(e) => db_error("Failed to list conversations", e),
    }
}

async fn create_conversation(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateConversationRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let external_id = body.external_id.trim();
    if external_id.is_empty() {
        return bad_request("external_id is required");
    }

    match state
        .db
        .create_conversation(user.id, body.platform, external_id, body.client_name.as_deref())
    {
        Ok(conversation) => HttpResponse::Created().json(conversation),
        Err(e) if is_constraint_violation(&e) => HttpResponse::Conflict().json(serde_json::json!({
            "error": "A conversation with this platform and external_id already exists"
        })),
        Err(e) => db_error("Failed to create conversation", e),
    }
}

/// Load a conversation owned by the user, or the error response to return
fn owned_conversation(state: &AppState, user_id: i64, id: i64) -> Result<Conversation, HttpResponse> {
    match state.db.get_conversation(user_id, id) {
        Ok(Some(conversation)) => Ok(conversation),
        Ok(None) => Err(not_found("Conversation")),
        Err(e) => Err(db_error("Failed to get conversation", e)),
    }
}

async fn get_conversation(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let conversation = match owned_conversation(&state, user.id, path.into_inner()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.db.list_messages(conversation.id) {
        Ok(messages) => HttpResponse::Ok().json(ConversationWithMessages { conversation, messages }),
        Err(e) => db_error("Failed to list messages", e),
    }
}

async fn update_conversation(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateConversationRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.update_conversation(user.id, path.into_inner(), &body) {
        Ok(Some(conversation)) => HttpResponse::Ok().json(conversation),
        Ok(None) => not_found("Conversation"),
        Err(e) => db_error("Failed to update conversation", e),
    }
}

async fn delete_conversation(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.delete_conversation(user.id, path.into_inner()) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Ok(false) => not_found("Conversation"),
        Err(e) => db_error("Failed to delete conversation", e),
    }
}

async fn list_messages(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let conversation = match owned_conversation(&state, user.id, path.into_inner()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.db.list_messages(conversation.id) {
        Ok(messages) => HttpResponse::Ok().json(messages),
        Err(e) => db_error("Failed to list messages", e),
    }
}

async fn create_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<CreateMessageRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let conversation = match owned_conversation(&state, user.id, path.into_inner()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let content = body.content.trim();
    if content.is_empty() {
        return bad_request("content cannot be empty");
    }
    let sender_type = body.sender_type.unwrap_or(SenderType::Agent);

    // Agent replies go out through the platform before they are stored
    if sender_type == SenderType::Agent {
        if let Some(kind) = IntegrationKind::for_platform(conversation.platform) {
            if let Err(resp) = deliver_reply(&state, user.id, kind, &conversation, content).await {
                return resp;
            }
        }
    }

    match state
        .db
        .add_message(conversation.id, sender_type, content, classify_sentiment(content), None)
    {
        Ok(message) => HttpResponse::Created().json(message),
        Err(e) => db_error("Failed to store message", e),
    }
}

async fn deliver_reply(
    state: &AppState,
    user_id: i64,
    kind: IntegrationKind,
    conversation: &Conversation,
    content: &str,
) -> Result<(), HttpResponse> {
    let Some(adapter) = state.integrations.get(kind).filter(|a| a.supports_replies()) else {
        return Ok(());
    };
    let integration = match state.db.get_integration(user_id, kind) {
        Ok(Some(integration)) => integration,
        Ok(None) => return Ok(()),
        Err(e) => return Err(db_error("Failed to load integration", e)),
    };

    match adapter.send_reply(&integration.config, &conversation.external_id, content).await {
        Ok(()) => Ok(()),
        Err(e) => {
            log::error!(
                "[INTEGRATION] Failed to deliver {} reply for conversation {}: {}",
                kind,
                conversation.id,
                e
            );
            Err(HttpResponse::BadGateway().json(serde_json::json!({
                "error": format!("Failed to deliver message: {}", e)
            })))
        }
    }
}
