use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use uuid::Uuid;

use crate::db::{DiagnosisRecord, DiagnosisRepository};
use crate::diagnosis::DiagnosisEngine;
use crate::error::AnalysisError;
use crate::storage::LocalStorage;

pub fn configure_routes(cfg: &mut web::ServiceConfig, upload_dir: String) {
    cfg.service(web::resource("/api/analyze").route(web::post().to(analyze_image)))
        .service(web::resource("/api/history").route(web::get().to(get_history)))
        .service(web::resource("/api/health").route(web::get().to(health_check)))
        .service(Files::new("/static", upload_dir));
}

struct AnalyzeUpload {
    image_data: Vec<u8>,
    content_type: String,
    file_name: Option<String>,
    crop_type: String,
}

async fn read_multipart(mut payload: Multipart) -> Result<AnalyzeUpload, AnalysisError> {
    let mut upload = AnalyzeUpload {
        image_data: Vec::new(),
        content_type: String::new(),
        file_name: None,
        crop_type: "auto".to_string(),
    };

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AnalysisError::InvalidInput(format!("malformed upload: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| AnalysisError::InvalidInput(format!("malformed upload: {e}")))?;
            data.extend_from_slice(&chunk);
        }

        match field_name.as_str() {
            "image" => {
                upload.content_type = field
                    .content_type()
                    .map(|mime| mime.to_string())
                    .unwrap_or_default();
                upload.file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(|name| name.to_string());
                upload.image_data = data;
            }
            "cropType" => {
                if let Ok(value) = String::from_utf8(data) {
                    let value = value.trim().to_string();
                    if !value.is_empty() {
                        upload.crop_type = value;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(upload)
}

fn optional_user_id(req: &HttpRequest) -> Option<Uuid> {
    req.headers()
        .get("X-User-Id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

async fn analyze_image(
    engine: web::Data<DiagnosisEngine>,
    storage: web::Data<LocalStorage>,
    repo: web::Data<DiagnosisRepository>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<HttpResponse, AnalysisError> {
    let upload = read_multipart(payload).await?;
    let user_id = optional_user_id(&req);

    let response = engine
        .analyze(&upload.image_data, &upload.content_type, &upload.crop_type)
        .await?;

    let image_url = storage
        .store(&upload.image_data, upload.file_name.as_deref())
        .map_err(|e| AnalysisError::Persistence(e.to_string()))?;

    let record = DiagnosisRecord::new(
        user_id,
        upload.crop_type,
        response.disease.id.clone(),
        response.confidence,
        response.health_score.score,
        image_url,
    );
    repo.insert(record)
        .map_err(|e| AnalysisError::Persistence(e.to_string()))?;

    Ok(HttpResponse::Ok().json(response))
}

async fn get_history(repo: web::Data<DiagnosisRepository>, req: HttpRequest) -> HttpResponse {
    let user_id = optional_user_id(&req);
    HttpResponse::Ok().json(repo.list(user_id))
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "online",
        "service": "PlantCare AI Backend",
        "version": "1.0.0",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};

    const BOUNDARY: &str = "leafboundary";

    fn test_services(dir: &std::path::Path) -> (DiagnosisEngine, LocalStorage, DiagnosisRepository, String) {
        let engine = DiagnosisEngine::new(
            None,
            "weights/does-not-exist.onnx".to_string(),
            Vec::new(),
        );
        let upload_dir = dir.join("uploads").to_string_lossy().to_string();
        let storage = LocalStorage::new(&upload_dir).unwrap();
        let repo = DiagnosisRepository::open(dir.join("history.jsonl")).unwrap();
        (engine, storage, repo, upload_dir)
    }

    fn analyze_request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/analyze")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn well_formed_upload_is_analyzed_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, storage, repo, upload_dir) = test_services(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(engine))
                .app_data(web::Data::new(storage))
                .app_data(web::Data::new(repo.clone()))
                .configure(move |cfg| configure_routes(cfg, upload_dir.clone())),
        )
        .await;

        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"leaf.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n\
             fake image bytes\r\n\
             --{BOUNDARY}--\r\n"
        )
        .into_bytes();

        let resp = test::call_service(&app, analyze_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let history = repo.list(None);
        assert_eq!(history.len(), 1);
        assert!(history[0].image_url.starts_with("/static/"));
    }

    #[actix_web::test]
    async fn broken_field_headers_are_rejected_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, storage, repo, upload_dir) = test_services(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(engine))
                .app_data(web::Data::new(storage))
                .app_data(web::Data::new(repo.clone()))
                .configure(move |cfg| configure_routes(cfg, upload_dir.clone())),
        )
        .await;

        // part headers without a colon make the field stream itself error
        let body = format!(
            "--{BOUNDARY}\r\n\
             not a header line\r\n\r\n\
             data\r\n\
             --{BOUNDARY}--\r\n"
        )
        .into_bytes();

        let resp = test::call_service(&app, analyze_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(repo.list(None).is_empty());
    }
}
