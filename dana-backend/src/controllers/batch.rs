use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::middleware::session_auth::require_user;
use crate::models::{BatchJob, CreateBatchJobRequest, JobStatus};
use crate::AppState;

use super::{db_error, not_found};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/batch/jobs")
            .route("", web::get().to(list_jobs))
            .route("", web::post().to(create_job))
            .route("/{id}", web::get().to(get_job))
            .route("/{id}/cancel", web::post().to(cancel_job))
            .route("/{id}/download", web::get().to(download_job)),
    );
}

fn conflict(message: &str) -> HttpResponse {
    HttpResponse::Conflict().json(serde_json::json!({ "error": message }))
}

fn owned_job(state: &AppState, user_id: i64, id: i64) -> Result<BatchJob, HttpResponse> {
    match state.db.get_batch_job(user_id, id) {
        Ok(Some(job)) => Ok(job),
        Ok(None) => Err(not_found("Job")),
        Err(e) => Err(db_error("Failed to get job", e)),
    }
}

async fn create_job(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateBatchJobRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.create_batch_job(user.id, body.job_type) {
        Ok(job) => {
            log::info!("[BATCH] User {} queued job {} ({})", user.id, job.id, job.job_type);
            state.batch_runner.submit(job.clone());
            HttpResponse::Accepted().json(job)
        }
        Err(e) => db_error("Failed to create job", e),
    }
}

async fn list_jobs(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.list_batch_jobs(user.id) {
        Ok(jobs) => HttpResponse::Ok().json(jobs),
        Err(e) => db_error("Failed to list jobs", e),
    }
}

async fn get_job(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match owned_job(&state, user.id, path.into_inner()) {
        Ok(job) => HttpResponse::Ok().json(job),
        Err(resp) => resp,
    }
}

async fn cancel_job(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let job = match owned_job(&state, user.id, path.into_inner()) {
        Ok(job) => job,
        Err(resp) => return resp,
    };
    if !job.status.is_live() {
        return conflict("Only pending or running jobs can be cancelled");
    }

    match state.batch_runner.cancel(user.id, job.id) {
        Ok(Some(job)) => HttpResponse::Ok().json(job),
        // Finished between the lookup and the update
        Ok(None) => conflict("Only pending or running jobs can be cancelled"),
        Err(e) => db_error("Failed to cancel job", e),
    }
}

async fn download_job(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let job = match owned_job(&state, user.id, path.into_inner()) {
        Ok(job) => job,
        Err(resp) => return resp,
    };
    if job.status != JobStatus::Completed {
        return conflict("Job has not completed");
    }
    let Some(result_path) = job.result_path.as_deref() else {
        return not_found("Export file");
    };

    match tokio::fs::read(result_path).await {
        Ok(bytes) => {
            let filename = format!("job-{}-{}.json", job.id, job.job_type);
            HttpResponse::Ok()
                .content_type("application/json")
                .insert_header(("Content-Disposition", format!("attachment; filename=\"{}\"", filename)))
                .body(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found("Export file"),
        Err(e) => {
            log::error!("[BATCH] Failed to read export {}: {}", result_path, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to read export"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::{bearer, seed_user, test_state};
    use crate::models::{CreateTaskRequest, JobType};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::time::Duration;

    #[actix_web::test]
    async fn test_export_job_completes_and_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (user, token) = seed_user(&state, "owner@example.com");
        state
            .db
            .create_task(
                user.id,
                &CreateTaskRequest {
                    title: "Follow up".into(),
                    description: None,
                    status: None,
                    priority: None,
                    due_date: None,
                    conversation_id: None,
                },
            )
            .unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/batch/jobs")
            .insert_header(bearer(&token))
            .set_json(json!({"job_type": "export_tasks"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let job: Value = test::read_body_json(resp).await;
        assert_eq!(job["status"], "pending");
        let id = job["id"].as_i64().unwrap();

        let mut status = String::new();
        for _ in 0..100 {
            let job = state.db.get_batch_job(user.id, id).unwrap().unwrap();
            status = job.status.to_string();
            if !job.status.is_live() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, "completed");

        let req = test::TestRequest::get()
            .uri(&format!("/api/batch/jobs/{}/download", id))
            .insert_header(bearer(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("Content-Disposition").is_some());
        let export: Value = test::read_body_json(resp).await;
        assert_eq!(export["item_count"], 1);
        assert_eq!(export["items"][0]["title"], "Follow up");

        let req = test::TestRequest::post()
            .uri(&format!("/api/batch/jobs/{}/cancel", id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_cancel_pending_and_download_guard() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (user, token) = seed_user(&state, "owner@example.com");
        let (_, other_token) = seed_user(&state, "other@example.com");
        // Created directly so no runner picks it up
        let job = state.db.create_batch_job(user.id, JobType::ExportConversations).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/batch/jobs/{}/download", job.id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri(&format!("/api/batch/jobs/{}/cancel", job.id))
            .insert_header(bearer(&other_token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri(&format!("/api/batch/jobs/{}/cancel", job.id))
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "cancelled");

        let req = test::TestRequest::get().uri("/api/batch/jobs").insert_header(bearer(&token)).to_request();
        let jobs: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
    }
}
