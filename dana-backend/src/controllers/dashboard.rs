use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::analytics::{average_response_minutes, topic_breakdown, zero_fill_activity, SentimentBreakdown, TopicCount};
use crate::db::{DailyActivity, PlatformCount, StatusCount};
use crate::middleware::session_auth::require_user;
use crate::AppState;

use super::{bad_request, db_error, DaysQuery};

#[derive(Serialize)]
pub struct DashboardSummary {
    conversations_by_status: Vec<StatusCount>,
    conversations_by_platform: Vec<PlatformCount>,
    total_messages: i64,
    tasks_by_status: Vec<StatusCount>,
    overdue_tasks: i64,
    avg_first_response_minutes: Option<f64>,
}

#[derive(Serialize)]
pub struct SentimentResponse {
    days: i64,
    total: i64,
    #[serde(flatten)]
    breakdown: SentimentBreakdown,
}

#[derive(Serialize)]
pub struct TopicsResponse {
    days: i64,
    topics: Vec<TopicCount>,
}

#[derive(Serialize)]
pub struct ActivityResponse {
    days: i64,
    activity: Vec<DailyActivity>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/dashboard")
            .route("/summary", web::get().to(summary))
            .route("/sentiment", web::get().to(sentiment))
            .route("/topics", web::get().to(topics))
            .route("/activity", web::get().to(activity)),
    );
}

/// Midnight UTC at the start of a `days` long window ending today
fn window_start(today: NaiveDate, days: i64) -> DateTime<Utc> {
    (today - Duration::days(days - 1)).and_time(NaiveTime::MIN).and_utc()
}

async fn summary(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let db = &state.db;
    let today = Utc::now().date_naive();

    let result = (|| -> rusqlite::Result<DashboardSummary> {
        Ok(DashboardSummary {
            conversations_by_status: db.conversation_status_counts(user.id)?,
            conversations_by_platform: db.conversation_platform_counts(user.id)?,
            total_messages: db.message_count(user.id)?,
            tasks_by_status: db.task_status_counts(user.id)?,
            overdue_tasks: db.overdue_task_count(user.id, today)?,
            avg_first_response_minutes: average_response_minutes(&db.response_time_samples(user.id)?),
        })
    })();

    match result {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => db_error("Failed to build dashboard summary", e),
    }
}

async fn sentiment(state: web::Data<AppState>, req: HttpRequest, query: web::Query<DaysQuery>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let days = match query.resolve() {
        Ok(days) => days,
        Err(msg) => return bad_request(msg),
    };
    let since = window_start(Utc::now().date_naive(), days);

    match state.db.client_sentiment_counts(user.id, since) {
        Ok(counts) => {
            let breakdown = SentimentBreakdown::from_counts(&counts);
            HttpResponse::Ok().json(SentimentResponse { days, total: breakdown.total(), breakdown })
        }
        Err(e) => db_error("Failed to count sentiment", e),
    }
}

async fn topics(state: web::Data<AppState>, req: HttpRequest, query: web::Query<DaysQuery>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let days = match query.resolve() {
        Ok(days) => days,
        Err(msg) => return bad_request(msg),
    };
    let since = window_start(Utc::now().date_naive(), days);

    match state.db.client_message_texts(user.id, since) {
        Ok(texts) => HttpResponse::Ok().json(TopicsResponse { days, topics: topic_breakdown(&texts) }),
        Err(e) => db_error("Failed to load messages", e),
    }
}

async fn activity(state: web::Data<AppState>, req: HttpRequest, query: web::Query<DaysQuery>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let days = match query.resolve() {
        Ok(days) => days,
        Err(msg) => return bad_request(msg),
    };
    let today = Utc::now().date_naive();

    match state.db.daily_message_counts(user.id, window_start(today, days)) {
        Ok(sparse) => HttpResponse::Ok().json(ActivityResponse {
            days,
            activity: zero_fill_activity(&sparse, days, today),
        }),
        Err(e) => db_error("Failed to count activity", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::classify_sentiment;
    use crate::controllers::test_support::{bearer, seed_user, test_state};
    use crate::models::{Platform, SenderType};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn test_window_start() {
        let today = NaiveDate::from_ymd_opt(2030, 3, 10).unwrap();
        assert_eq!(window_start(today, 1).to_rfc3339(), "2030-03-10T00:00:00+00:00");
        assert_eq!(window_start(today, 7).to_rfc3339(), "2030-03-04T00:00:00+00:00");
    }

    #[actix_web::test]
    async fn test_dashboard_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (user, token) = seed_user(&state, "owner@example.com");
        let conversation = state.db.create_conversation(user.id, Platform::Whatsapp, "15550001", None).unwrap();
        for text in ["My invoice was charged twice", "The app is broken and crashes", "Thanks, great help!"] {
            state
                .db
                .add_message(conversation.id, SenderType::Client, text, classify_sentiment(text), None)
                .unwrap();
        }
        state
            .db
            .add_message(conversation.id, SenderType::Agent, "Looking into it", classify_sentiment("Looking into it"), None)
            .unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/dashboard/summary").insert_header(bearer(&token)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_messages"], 4);
        assert_eq!(body["overdue_tasks"], 0);
        assert!(body["avg_first_response_minutes"].is_number());

        let req = test::TestRequest::get()
            .uri("/api/dashboard/sentiment?days=7")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["positive"], 1);
        assert_eq!(body["negative"], 1);

        let req = test::TestRequest::get().uri("/api/dashboard/topics").insert_header(bearer(&token)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let topics = body["topics"].as_array().unwrap();
        assert_eq!(topics.len(), 6);
        let total: i64 = topics.iter().map(|t| t["count"].as_i64().unwrap()).sum();
        assert_eq!(total, 3);

        let req = test::TestRequest::get()
            .uri("/api/dashboard/activity?days=3")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let activity = body["activity"].as_array().unwrap();
        assert_eq!(activity.len(), 3);
        assert_eq!(activity[2]["count"], 4);
        assert_eq!(activity[0]["count"], 0);

        let req = test::TestRequest::get()
            .uri("/api/dashboard/activity?days=120")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
