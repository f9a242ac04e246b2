use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use futures_util::TryStreamExt;
use serde::Deserialize;

use crate::knowledge::{
    allowed_extension, build_snippet, extract_text, parse_tags, remove_upload, store_upload, text_limit,
    AnalysisKind, ExtractError, KnowledgeAnalyzer,
};
use crate::middleware::session_auth::require_user;
use crate::models::{KnowledgeSearchHit, NewKnowledgeFile, UpdateKnowledgeFileRequest};
use crate::AppState;

use super::{bad_request, db_error, not_found};

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub analysis: Option<AnalysisKind>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/knowledge")
            .route("/search", web::get().to(search))
            .route("/files", web::get().to(list_files))
            .route("/files", web::post().to(upload_file))
            .route("/files/{id}", web::get().to(get_file))
            .route("/files/{id}", web::put().to(update_file))
            .route("/files/{id}", web::delete().to(delete_file))
            .route("/files/{id}/analyze", web::post().to(analyze_file)),
    );
}

/// Parts of a multipart upload we care about
#[derive(Default)]
struct UploadForm {
    filename: Option<String>,
    bytes: Vec<u8>,
    category: Option<String>,
    tags: Vec<String>,
}

enum UploadError {
    Malformed(String),
    TooLarge,
}

async fn read_upload(mut payload: Multipart, max_bytes: usize) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| UploadError::Malformed(e.to_string()))?
    {
        let disposition = field.content_disposition().clone();
        let name = disposition.get_name().unwrap_or_default().to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| UploadError::Malformed(e.to_string()))?
        {
            if data.len() + chunk.len() > max_bytes {
                return Err(UploadError::TooLarge);
            }
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" => {
                form.filename = disposition.get_filename().map(str::to_string);
                form.bytes = data;
            }
            "category" => {
                let category = String::from_utf8_lossy(&data).trim().to_string();
                form.category = (!category.is_empty()).then_some(category);
            }
            "tags" => form.tags = parse_tags(&String::from_utf8_lossy(&data)),
            _ => {}
        }
    }

    Ok(form)
}

async fn upload_file(state: web::Data<AppState>, req: HttpRequest, payload: Multipart) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let form = match read_upload(payload, state.config.max_upload_bytes).await {
        Ok(form) => form,
        Err(UploadError::TooLarge) => {
            return HttpResponse::PayloadTooLarge().json(serde_json::json!({
                "error": format!("File exceeds the {} byte upload limit", state.config.max_upload_bytes)
            }));
        }
        Err(UploadError::Malformed(e)) => return bad_request(format!("Invalid multipart body: {}", e)),
    };

    let Some(filename) = form.filename.filter(|f| !f.trim().is_empty()) else {
        return bad_request("A 'file' field with a filename is required");
    };
    let Some(extension) = allowed_extension(&filename) else {
        return bad_request("Unsupported file type; allowed: pdf, docx, txt, md, csv, json");
    };

    // PDF parsing is CPU bound
    let bytes = form.bytes;
    let content = {
        let ext = extension.clone();
        let bytes = bytes.clone();
        let limit = text_limit(state.config.max_upload_bytes);
        match web::block(move || extract_text(&ext, &bytes, limit)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e @ ExtractError::TooLarge(_))) => {
                return HttpResponse::PayloadTooLarge().json(serde_json::json!({ "error": e.to_string() }));
            }
            Ok(Err(e)) => return bad_request(e.to_string()),
            Err(e) => {
                log::error!("[KNOWLEDGE] Extraction task failed: {}", e);
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to process file"
                }));
            }
        }
    };

    let stored_path = match store_upload(&state.config.upload_dir, user.id, &extension, &bytes).await {
        Ok(path) => path,
        Err(e) => {
            log::error!("[KNOWLEDGE] Failed to store upload: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to store file"
            }));
        }
    };

    let new_file = NewKnowledgeFile {
        filename: filename.trim().to_string(),
        file_type: extension,
        file_size: bytes.len() as i64,
        stored_path: stored_path.to_string_lossy().into_owned(),
        content,
        category: form.category,
        tags: form.tags,
    };

    match state.db.create_knowledge_file(user.id, &new_file) {
        Ok(file) => {
            log::info!("[KNOWLEDGE] User {} uploaded {} ({} bytes)", user.id, file.filename, file.file_size);
            HttpResponse::Created().json(file)
        }
        Err(e) => {
            if let Err(err) = remove_upload(&new_file.stored_path).await {
                log::warn!("[KNOWLEDGE] Failed to clean up {}: {}", new_file.stored_path, err);
            }
            db_error("Failed to save knowledge file", e)
        }
    }
}

async fn list_files(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.list_knowledge_files(user.id) {
        Ok(files) => HttpResponse::Ok().json(files),
        Err(e) => db_error("Failed to list knowledge files", e),
    }
}

async fn get_file(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.db.get_knowledge_file(user.id, path.into_inner()) {
        Ok(Some(file)) => HttpResponse::Ok().json(file),
        Ok(None) => not_found("Knowledge file"),
        Err(e) => db_error("Failed to get knowledge file", e),
    }
}

async fn update_file(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateKnowledgeFileRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let mut update = body.into_inner();
    update.category = update.category.map(|c| c.trim().to_string());
    update.tags = update.tags.map(|tags| parse_tags(&tags.join(",")));

    match state.db.update_knowledge_file(user.id, path.into_inner(), &update) {
        Ok(Some(file)) => HttpResponse::Ok().json(file),
        Ok(None) => not_found("Knowledge file"),
        Err(e) => db_error("Failed to update knowledge file", e),
    }
}

async fn delete_file(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let id = path.into_inner();
    let file = match state.db.get_knowledge_file(user.id, id) {
        Ok(Some(file)) => file,
        Ok(None) => return not_found("Knowledge file"),
        Err(e) => return db_error("Failed to get knowledge file", e),
    };

    match state.db.delete_knowledge_file(user.id, id) {
        Ok(_) => {
            if let Err(e) = remove_upload(&file.stored_path).await {
                log::warn!("[KNOWLEDGE] Failed to remove {}: {}", file.stored_path, e);
            }
            HttpResponse::Ok().json(serde_json::json!({ "success": true }))
        }
        Err(e) => db_error("Failed to delete knowledge file", e),
    }
}

async fn search(state: web::Data<AppState>, req: HttpRequest, query: web::Query<SearchQuery>) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return bad_request("q is required");
    }

    match state.db.search_knowledge_files(user.id, q, SEARCH_LIMIT) {
        Ok(files) => {
            let hits: Vec<KnowledgeSearchHit> = files
                .into_iter()
                .map(|file| KnowledgeSearchHit {
                    snippet: build_snippet(file.content.as_deref().unwrap_or_default(), q),
                    id: file.id,
                    filename: file.filename,
                    file_type: file.file_type,
                    category: file.category,
                    tags: file.tags,
                })
                .collect();
            HttpResponse::Ok().json(hits)
        }
        Err(e) => db_error("Failed to search knowledge files", e),
    }
}

async fn analyze_file(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Bytes,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    // An empty body means the default analysis
    let request: AnalyzeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AnalyzeRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => return bad_request(format!("Invalid analysis request: {}", e)),
        }
    };

    let file = match state.db.get_knowledge_file(user.id, path.into_inner()) {
        Ok(Some(file)) => file,
        Ok(None) => return not_found("Knowledge file"),
        Err(e) => return db_error("Failed to get knowledge file", e),
    };

    let analyzer = match KnowledgeAnalyzer::from_config(&state.config) {
        Ok(Some(analyzer)) => analyzer,
        Ok(None) => {
            return HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "AI analysis is not configured"
            }));
        }
        Err(e) => {
            log::error!("[KNOWLEDGE] Failed to build analyzer: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "AI analysis is unavailable"
            }));
        }
    };

    let kind = request.analysis.unwrap_or_default();
    match analyzer.analyze(kind, &file).await {
        Ok(result) => HttpResponse::Ok().json(serde_json::json!({
            "file_id": file.id,
            "analysis": kind.as_ref(),
            "result": result,
        })),
        Err(e) => {
            log::error!("[KNOWLEDGE] Analysis of file {} failed: {}", file.id, e);
            HttpResponse::BadGateway().json(serde_json::json!({ "error": e }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::{bearer, seed_user, test_state};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    const BOUNDARY: &str = "----dana-test-boundary";

    fn multipart_body(filename: &str, content: &[u8], extra: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in extra {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(token: &str, body: Vec<u8>) -> actix_web::test::TestRequest {
        test::TestRequest::post()
            .uri("/api/knowledge/files")
            .insert_header(bearer(token))
            .insert_header(("Content-Type", format!("multipart/form-data; boundary={}", BOUNDARY)))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn test_upload_search_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (_, token) = seed_user(&state, "owner@example.com");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let text = b"Refund policy: customers may request a refund within 30 days of delivery.";
        let body = multipart_body("policy.txt", text, &[("category", "Policies"), ("tags", "Refunds, billing")]);
        let resp = test::call_service(&app, upload_request(&token, body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let file: Value = test::read_body_json(resp).await;
        assert_eq!(file["file_type"], "txt");
        assert_eq!(file["category"], "Policies");
        assert_eq!(file["tags"], json!(["refunds", "billing"]));
        let id = file["id"].as_i64().unwrap();

        let stored = state.db.get_knowledge_file(file["user_id"].as_i64().unwrap(), id).unwrap().unwrap();
        assert!(std::path::Path::new(&stored.stored_path).exists());

        let req = test::TestRequest::get()
            .uri("/api/knowledge/search?q=30%20days")
            .insert_header(bearer(&token))
            .to_request();
        let hits: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(hits.as_array().unwrap().len(), 1);
        assert!(hits[0]["snippet"].as_str().unwrap().contains("30 days"));

        let req = test::TestRequest::get()
            .uri(&format!("/api/knowledge/files/{}", id))
            .insert_header(bearer(&token))
            .to_request();
        let full: Value = test::call_and_read_body_json(&app, req).await;
        assert!(full["content"].as_str().unwrap().starts_with("Refund policy"));

        let req = test::TestRequest::delete()
            .uri(&format!("/api/knowledge/files/{}", id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(!std::path::Path::new(&stored.stored_path).exists());
    }

    #[actix_web::test]
    async fn test_upload_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (user, token) = seed_user(&state, "owner@example.com");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let body = multipart_body("malware.exe", b"MZ", &[]);
        let resp = test::call_service(&app, upload_request(&token, body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let big = vec![b'a'; state.config.max_upload_bytes + 1];
        let body = multipart_body("big.txt", &big, &[]);
        let resp = test::call_service(&app, upload_request(&token, body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        // Small on the wire, far past the text limit once inflated
        let run = "a".repeat(text_limit(state.config.max_upload_bytes) + 1);
        let xml = format!("<w:document><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>", run);
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer.start_file("word/document.xml", zip::write::FileOptions::default()).unwrap();
        std::io::Write::write_all(&mut writer, xml.as_bytes()).unwrap();
        let docx = writer.finish().unwrap().into_inner();
        assert!(docx.len() < state.config.max_upload_bytes);

        let body = multipart_body("manual.docx", &docx, &[]);
        let resp = test::call_service(&app, upload_request(&token, body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(state.db.list_knowledge_files(user.id).unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_update_and_analyze_without_llm() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (user, token) = seed_user(&state, "owner@example.com");
        let file = state
            .db
            .create_knowledge_file(
                user.id,
                &NewKnowledgeFile {
                    filename: "faq.md".into(),
                    file_type: "md".into(),
                    file_size: 12,
                    stored_path: dir.path().join("faq.md").to_string_lossy().into_owned(),
                    content: "Shipping takes 3 days.".into(),
                    category: None,
                    tags: vec![],
                },
            )
            .unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::put()
            .uri(&format!("/api/knowledge/files/{}", file.id))
            .insert_header(bearer(&token))
            .set_json(json!({"category": "Shipping", "tags": ["Delivery", "delivery"]}))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["category"], "Shipping");
        assert_eq!(updated["tags"], json!(["delivery"]));

        let req = test::TestRequest::post()
            .uri(&format!("/api/knowledge/files/{}/analyze", file.id))
            .insert_header(bearer(&token))
            .set_json(json!({"analysis": "faq"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = test::TestRequest::post()
            .uri(&format!("/api/knowledge/files/{}/analyze", file.id))
            .insert_header(bearer(&token))
            .set_json(json!({"analysis": "poem"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/knowledge/files/9999/analyze")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
