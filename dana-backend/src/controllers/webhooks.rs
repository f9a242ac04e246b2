//! Meta (Facebook / Instagram / WhatsApp) webhook endpoints

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::Value;

use crate::analytics::classify_sentiment;
use crate::integrations::meta::routing_field;
use crate::middleware::session_auth::require_admin;
use crate::models::{IntegrationKind, Platform, SenderType};
use crate::webhooks::{parse_inbound, verify_signature, webhook_platform, InboundMessage};
use crate::AppState;

use super::db_error;

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/webhooks")
            .route("/events", web::get().to(list_events))
            .route("/{platform}", web::get().to(verify))
            .route("/{platform}", web::post().to(receive)),
    );
}

fn unknown_platform(name: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": format!("Unsupported webhook platform: {}", name)
    }))
}

async fn verify(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<VerifyQuery>,
) -> impl Responder {
    let name = path.into_inner();
    if webhook_platform(&name).is_none() {
        return unknown_platform(&name);
    }

    let expected = state.config.meta_verify_token.as_deref();
    let token_ok = matches!((expected, query.verify_token.as_deref()), (Some(e), Some(t)) if e == t);
    match (query.mode.as_deref(), token_ok, query.challenge.as_deref()) {
        (Some("subscribe"), true, Some(challenge)) => {
            log::info!("[WEBHOOK] Verified {} subscription", name);
            HttpResponse::Ok().content_type("text/plain").body(challenge.to_string())
        }
        _ => {
            log::warn!("[WEBHOOK] Rejected {} verification request", name);
            HttpResponse::Forbidden().json(serde_json::json!({ "error": "Verification failed" }))
        }
    }
}

fn signature_header(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("X-Hub-Signature-256")
        .or_else(|| req.headers().get("X-Hub-Signature"))
        .and_then(|h| h.to_str().ok())
}

fn integration_kind(platform: Platform) -> Option<IntegrationKind> {
    match platform {
        Platform::Facebook => Some(IntegrationKind::Facebook),
        Platform::Instagram => Some(IntegrationKind::Instagram),
        Platform::Whatsapp => Some(IntegrationKind::Whatsapp),
        _ => None,
    }
}

/// Store one inbound message for the tenant that owns the receiving page / number.
/// Returns false when the message was skipped.
fn ingest(state: &AppState, platform: Platform, kind: IntegrationKind, msg: &InboundMessage) -> rusqlite::Result<bool> {
    let Some(field) = routing_field(kind) else {
        return Ok(false);
    };
    let Some(integration) = state.db.find_integration_by_field(kind, field, &msg.recipient_id)? else {
        log::warn!("[WEBHOOK] No {} integration for recipient {}", platform, msg.recipient_id);
        return Ok(false);
    };

    let conversation = state.db.get_or_create_conversation(
        integration.user_id,
        platform,
        &msg.sender_id,
        msg.sender_name.as_deref(),
    )?;
    if let Some(mid) = msg.message_id.as_deref() {
        if state.db.message_exists(conversation.id, mid)? {
            log::debug!("[WEBHOOK] Duplicate delivery of {} ignored", mid);
            return Ok(false);
        }
    }

    state.db.add_message(
        conversation.id,
        SenderType::Client,
        &msg.text,
        classify_sentiment(&msg.text),
        msg.message_id.as_deref(),
    )?;
    Ok(true)
}

async fn receive(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> impl Responder {
    let name = path.into_inner();
    let Some(platform) = webhook_platform(&name) else {
        return unknown_platform(&name);
    };

    if let Some(secret) = state.config.meta_app_secret.as_deref() {
        let valid = signature_header(&req).is_some_and(|sig| verify_signature(secret, &body, sig));
        if !valid {
            log::warn!("[WEBHOOK] Invalid signature on {} delivery", platform);
            return HttpResponse::Unauthorized().json(serde_json::json!({ "error": "Invalid signature" }));
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("[WEBHOOK] Malformed {} payload: {}", platform, e);
            return HttpResponse::BadRequest().json(serde_json::json!({ "error": "Payload must be JSON" }));
        }
    };

    let messages = parse_inbound(platform, &payload);
    let mut processed = 0i64;
    let mut skipped = 0i64;
    let mut error = None;

    if let Some(kind) = integration_kind(platform) {
        for msg in &messages {
            match ingest(&state, platform, kind, msg) {
                Ok(true) => processed += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    log::error!("[WEBHOOK] Failed to store {} message: {}", platform, e);
                    error = Some(e.to_string());
                    skipped += 1;
                }
            }
        }
    }

    if let Err(e) = state
        .db
        .record_webhook_event(platform, &payload, processed, skipped, error.as_deref())
    {
        log::error!("[WEBHOOK] Failed to record event: {}", e);
    }
    log::info!("[WEBHOOK] {} delivery: {} processed, {} skipped", platform, processed, skipped);

    HttpResponse::Ok().json(serde_json::json!({ "received": true, "processed": processed }))
}

async fn list_events(state: web::Data<AppState>, req: HttpRequest, query: web::Query<EventsQuery>) -> impl Responder {
    if let Err(resp) = require_admin(&state.db, &req) {
        return resp;
    }
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    match state.db.list_webhook_events(limit) {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => db_error("Failed to list webhook events", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::controllers::test_support::{bearer, seed_user, test_state, test_state_with};
    use crate::webhooks::sign_sha256;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::json;

    fn messenger_payload(page: &str, sender: &str, mid: &str, text: &str) -> Value {
        json!({
            "object": "page",
            "entry": [{
                "id": page,
                "messaging": [{
                    "sender": {"id": sender},
                    "recipient": {"id": page},
                    "message": {"mid": mid, "text": text}
                }]
            }]
        })
    }

    #[actix_web::test]
    async fn test_verification_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri("/api/webhooks/facebook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=12345")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, actix_web::web::Bytes::from_static(b"12345"));

        let req = test::TestRequest::get()
            .uri("/api/webhooks/facebook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=12345")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get().uri("/api/webhooks/myspace").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_inbound_routing_and_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (admin, admin_token) = seed_user(&state, "owner@example.com");
        let mut page = serde_json::Map::new();
        page.insert("page_id".into(), json!("PAGE1"));
        page.insert("access_token".into(), json!("token"));
        state.db.upsert_integration(admin.id, IntegrationKind::Facebook, &page).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let payload = messenger_payload("PAGE1", "U1", "m1", "This is great, thanks!");
        for expected in [1, 0] {
            let req = test::TestRequest::post()
                .uri("/api/webhooks/facebook")
                .set_json(payload.clone())
                .to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["received"], true);
            assert_eq!(body["processed"], expected);
        }

        let req = test::TestRequest::post()
            .uri("/api/webhooks/facebook")
            .set_json(messenger_payload("UNKNOWN", "U2", "m2", "hi"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["processed"], 0);

        let conversation = state
            .db
            .get_or_create_conversation(admin.id, Platform::Facebook, "U1", None)
            .unwrap();
        let messages = state.db.list_messages(conversation.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_type, SenderType::Client);

        let req = test::TestRequest::get()
            .uri("/api/webhooks/events?limit=10")
            .insert_header(bearer(&admin_token))
            .to_request();
        let events: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(events.as_array().unwrap().len(), 3);
        assert_eq!(events[0]["skipped_count"], 1);

        let req = test::TestRequest::post()
            .uri("/api/webhooks/facebook")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("not json")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_signature_enforced_when_secret_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Config::for_tests(dir.path());
        settings.meta_app_secret = Some("app-secret".to_string());
        let state = test_state_with(settings);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let body = messenger_payload("PAGE1", "U1", "m1", "hello").to_string();

        let req = test::TestRequest::post()
            .uri("/api/webhooks/facebook")
            .set_payload(body.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/webhooks/facebook")
            .insert_header(("X-Hub-Signature-256", sign_sha256("app-secret", body.as_bytes())))
            .set_payload(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
