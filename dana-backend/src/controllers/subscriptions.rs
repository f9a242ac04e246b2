//! Subscription tiers, plan changes, invoices and payments

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::middleware::session_auth::{require_admin, require_user};
use crate::models::{
    BillingCycle, CreatePaymentRequest, CreateTierRequest, InvoiceStatus, SubscribeRequest, UpdateTierRequest,
};
use crate::AppState;

use super::{bad_request, db_error, is_constraint_violation, not_found};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/subscriptions")
            .route("", web::post().to(subscribe))
            .route("/tiers", web::get().to(list_tiers))
            .route("/current", web::get().to(current_subscription))
            .route("/cancel", web::post().to(cancel_subscription))
            .route("/invoices", web::get().to(list_invoices)),
    )
    .service(
        web::resource("/api/admin/tiers")
            .route(web::get().to(admin_list_tiers))
            .route(web::post().to(create_tier)),
    )
    .service(web::resource("/api/admin/tiers/{id}").route(web::put().to(update_tier)))
    .service(
        web::resource("/api/payments")
            .route(web::get().to(list_payments))
            .route(web::post().to(create_payment)),
    );
}

async fn list_tiers(state: web::Data<AppState>) -> impl Responder {
    match state.db.list_tiers(true) {
        Ok(tiers) => HttpResponse::Ok().json(tiers),
        Err(e) => db_error("Failed to list tiers", e),
    }
}

async fn admin_list_tiers(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state.db, &req) {
        return resp;
    }
    match state.db.list_tiers(false) {
        Ok(tiers) => HttpResponse::Ok().json(tiers),
        Err(e) => db_error("Failed to list tiers", e),
    }
}

fn check_prices(monthly: Option<i64>, annual: Option<i64>) -> Result<(), HttpResponse> {
    if monthly.is_some_and(|p| p < 0) || annual.is_some_and(|p| p < 0) {
        return Err(bad_request("Prices cannot be negative"));
    }
    Ok(())
}

async fn create_tier(state: web::Data<AppState>, req: HttpRequest, body: web::Json<CreateTierRequest>) -> impl Responder {
    let admin = match require_admin(&state.db, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let mut tier = body.into_inner();
    tier.name = tier.name.trim().to_string();
    if tier.name.is_empty() {
        return bad_request("name is required");
    }
    if let Err(resp) = check_prices(Some(tier.monthly_price_cents), Some(tier.annual_price_cents)) {
        return resp;
    }

    match state.db.create_tier(&tier) {
        Ok(created) => {
            log::info!("Admin {} created tier {}", admin.id, created.name);
            HttpResponse::Created().json(created)
        }
        Err(e) if is_constraint_violation(&e) => HttpResponse::Conflict().json(serde_json::json!({
            "error": "A tier with this name already exists"
        })),
        Err(e) => db_error("Failed to create tier", e),
    }
}

async fn update_tier(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateTierRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(&state.db, &req) {
        return resp;
    }
    if let Err(resp) = check_prices(body.monthly_price_cents, body.annual_price_cents) {
        return resp;
    }
    match state.db.update_tier(path.into_inner(), &body) {
        Ok(Some(tier)) => HttpResponse::Ok().json(tier),
        Ok(None) => not_found("Tier"),
        Err(e) => db_error("Failed to update tier", e),
    }
}

async fn current_subscription(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.get_active_subscription(user.id) {
        Ok(subscription) => HttpResponse::Ok().json(serde_json::json!({ "subscription": subscription })),
        Err(e) => db_error("Failed to load subscription", e),
    }
}

async fn subscribe(state: web::Data<AppState>, req: HttpRequest, body: web::Json<SubscribeRequest>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let tier = match state.db.get_tier(body.tier_id) {
        Ok(Some(tier)) if tier.is_active => tier,
        Ok(_) => return not_found("Tier"),
        Err(e) => return db_error("Failed to load tier", e),
    };
    let cycle = body.billing_cycle.unwrap_or(BillingCycle::Monthly);

    match state.db.subscribe(user.id, &tier, cycle) {
        Ok((subscription, invoice)) => {
            log::info!("User {} subscribed to {} ({})", user.id, tier.name, cycle);
            HttpResponse::Created().json(serde_json::json!({
                "subscription": subscription,
                "invoice": invoice,
            }))
        }
        Err(e) => db_error("Failed to create subscription", e),
    }
}

async fn cancel_subscription(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.cancel_subscription(user.id) {
        Ok(Some(subscription)) => {
            log::info!("User {} cancelled subscription {}", user.id, subscription.id);
            HttpResponse::Ok().json(subscription)
        }
        Ok(None) => not_found("Active subscription"),
        Err(e) => db_error("Failed to cancel subscription", e),
    }
}

async fn list_invoices(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.list_invoices(user.id) {
        Ok(invoices) => HttpResponse::Ok().json(invoices),
        Err(e) => db_error("Failed to list invoices", e),
    }
}

async fn create_payment(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreatePaymentRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if body.method.trim().is_empty() {
        return bad_request("method is required");
    }

    let invoice = match state.db.get_invoice(user.id, body.invoice_id) {
        Ok(Some(invoice)) => invoice,
        Ok(None) => return not_found("Invoice"),
        Err(e) => return db_error("Failed to load invoice", e),
    };
    let already_settled = || {
        HttpResponse::Conflict().json(serde_json::json!({
            "error": "Invoice is not awaiting payment"
        }))
    };
    if invoice.status != InvoiceStatus::Pending {
        return already_settled();
    }
    if body.amount_cents != invoice.amount_cents {
        return bad_request(format!(
            "Payment amount {} does not match invoice amount {}",
            body.amount_cents, invoice.amount_cents
        ));
    }

    match state.db.record_payment(user.id, &body) {
        Ok(Some(payment)) => {
            log::info!("User {} paid invoice {}", user.id, invoice.id);
            HttpResponse::Created().json(payment)
        }
        Ok(None) => already_settled(),
        Err(e) => db_error("Failed to record payment", e),
    }
}

async fn list_payments(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.list_payments(user.id) {
        Ok(payments) => HttpResponse::Ok().json(payments),
        Err(e) => db_error("Failed to list payments", e),
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
    async fn test_subscribe_and_pay() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (_, token) = seed_user(&state, "owner@example.com");
        let starter = state.db.get_tier_by_name("Starter").unwrap().unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/subscriptions/tiers").to_request();
        let tiers: Value = test::call_and_read_body_json(&app, req).await;
        assert!(tiers.as_array().unwrap().len() >= 3);

        let req = test::TestRequest::post()
            .uri("/api/subscriptions")
            .insert_header(bearer(&token))
            .set_json(json!({"tier_id": starter.id, "billing_cycle": "annual"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["subscription"]["tier_name"], "Starter");
        assert_eq!(body["invoice"]["status"], "pending");
        assert_eq!(body["invoice"]["amount_cents"], starter.annual_price_cents);
        let invoice_id = body["invoice"]["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri("/api/payments")
            .insert_header(bearer(&token))
            .set_json(json!({"invoice_id": invoice_id, "amount_cents": 1, "method": "card"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let pay = json!({"invoice_id": invoice_id, "amount_cents": starter.annual_price_cents, "method": "card"});
        let req = test::TestRequest::post()
            .uri("/api/payments")
            .insert_header(bearer(&token))
            .set_json(pay.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/payments")
            .insert_header(bearer(&token))
            .set_json(pay)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri("/api/subscriptions/invoices")
            .insert_header(bearer(&token))
            .to_request();
        let invoices: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(invoices[0]["status"], "paid");

        let req = test::TestRequest::post()
            .uri("/api/subscriptions/cancel")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/subscriptions/cancel")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/subscriptions/current")
            .insert_header(bearer(&token))
            .to_request();
        let current: Value = test::call_and_read_body_json(&app, req).await;
        assert!(current["subscription"].is_null());
    }

    #[actix_web::test]
    async fn test_admin_tier_management() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (_, admin_token) = seed_user(&state, "admin@example.com");
        let (_, user_token) = seed_user(&state, "user@example.com");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let tier = json!({"name": "Enterprise", "monthly_price_cents": 19900, "annual_price_cents": 199000});
        let req = test::TestRequest::post()
            .uri("/api/admin/tiers")
            .insert_header(bearer(&user_token))
            .set_json(tier.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/admin/tiers")
            .insert_header(bearer(&admin_token))
            .set_json(tier.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;

        let req = test::TestRequest::post()
            .uri("/api/admin/tiers")
            .insert_header(bearer(&admin_token))
            .set_json(tier)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::put()
            .uri(&format!("/api/admin/tiers/{}", created["id"]))
            .insert_header(bearer(&admin_token))
            .set_json(json!({"is_active": false}))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["is_active"], false);

        // Retired tiers cannot be subscribed to
        let req = test::TestRequest::post()
            .uri("/api/subscriptions")
            .insert_header(bearer(&user_token))
            .set_json(json!({"tier_id": created["id"]}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
