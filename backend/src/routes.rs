use actix_files::NamedFile;
use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{info, warn};
use shared::{ChatRequest, ChatResponse, HealthResponse, ImageType, OrganType};
use std::str::FromStr;

use crate::error::ApiError;
use crate::explanation::ExplanationService;
use crate::pipeline::{ScanPipeline, UploadRequest};
use crate::storage::{ImageStore, StorageArea};
use crate::translation::TranslationError;

const IMAGE_FIELD: &str = "image";
const ORGAN_FIELD: &str = "organType";
const IMAGE_TYPE_FIELD: &str = "imageType";
const MAX_TEXT_FIELD_BYTES: usize = 1024;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid JSON body: {}", err)).into()),
    )
    .service(web::resource("/api/upload").route(web::post().to(upload_scan)))
    .service(web::resource("/api/chat").route(web::post().to(chat)))
    .service(web::resource("/api/images/uploads/{filename}").route(web::get().to(serve_upload)))
    .service(web::resource("/api/images/results/{filename}").route(web::get().to(serve_result)))
    .service(web::resource("/api/health").route(web::get().to(health)));
}

struct UploadedFile {
    filename: String,
    data: Vec<u8>,
}

#[derive(Default)]
struct UploadForm {
    image: Option<UploadedFile>,
    organ_type: Option<String>,
    image_type: Option<String>,
}

/// Reads one part. `budget` is what is left of the whole-request allowance and
/// is charged for every chunk; `limit` caps this part on its own.
async fn read_field(field: &mut Field, budget: &mut usize, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if chunk.len() > *budget || data.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge);
        }
        *budget -= chunk.len();
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_upload_form(mut payload: Multipart, max_upload_bytes: usize) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    let mut budget = max_upload_bytes;

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            IMAGE_FIELD => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or_default()
                    .to_string();
                let data = read_field(&mut field, &mut budget, max_upload_bytes).await?;
                form.image = Some(UploadedFile { filename, data });
            }
            ORGAN_FIELD | IMAGE_TYPE_FIELD => {
                let raw = read_field(&mut field, &mut budget, MAX_TEXT_FIELD_BYTES).await?;
                let value = String::from_utf8_lossy(&raw).trim().to_string();
                if name == ORGAN_FIELD {
                    form.organ_type = Some(value);
                } else {
                    form.image_type = Some(value);
                }
            }
            _ => {
                // drain unknown parts so the stream can advance
                read_field(&mut field, &mut budget, max_upload_bytes).await?;
            }
        }
    }
    Ok(form)
}

fn parse_organ(value: Option<&str>) -> Result<OrganType, ApiError> {
    match value {
        None => Ok(OrganType::default()),
        Some(raw) => OrganType::from_str(raw).map_err(|_| {
            ApiError::BadRequest(format!("Invalid organ type '{}'. Use 'brain' or 'lungs'", raw))
        }),
    }
}

fn parse_image_type(value: Option<&str>) -> Result<ImageType, ApiError> {
    match value {
        None => Ok(ImageType::default()),
        Some(raw) => ImageType::from_str(raw)
            .map_err(|_| ApiError::BadRequest(TranslationError::InvalidModality(raw.to_string()).to_string())),
    }
}

async fn upload_scan(
    pipeline: web::Data<ScanPipeline>,
    explainer: web::Data<ExplanationService>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_upload_form(payload, pipeline.store().max_upload_bytes()).await?;

    let image = form
        .image
        .ok_or_else(|| ApiError::BadRequest("No image part".to_string()))?;
    if image.filename.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    }
    let extension = ImageStore::allowed_extension(&image.filename)
        .ok_or_else(|| ApiError::BadRequest("Invalid file type".to_string()))?;
    let organ = parse_organ(form.organ_type.as_deref())?;
    let image_type = parse_image_type(form.image_type.as_deref())?;

    info!(
        "Upload '{}' ({} bytes) as {} {}",
        image.filename,
        image.data.len(),
        organ,
        image_type
    );

    let request = UploadRequest {
        data: image.data,
        extension,
        organ,
        image_type,
    };
    let worker = pipeline.clone();
    let scan = web::block(move || worker.process(request)).await??;

    match explainer.initial_explanation(scan.prediction.label, scan.organ).await {
        Ok(explanation) => Ok(HttpResponse::Ok().json(scan.into_response(explanation))),
        Err(e) => {
            warn!("Explanation failed for {}, discarding results", scan.original.file_name);
            pipeline.discard(&scan);
            Err(e.into())
        }
    }
}

async fn chat(
    explainer: web::Data<ExplanationService>,
    body: web::Json<ChatRequest>,
) -> Result<HttpResponse, ApiError> {
    let ChatRequest {
        message,
        prediction,
        organ_type,
    } = body.into_inner();
    if message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let response = explainer.chat(&message, &prediction, organ_type).await?;
    Ok(HttpResponse::Ok().json(ChatResponse { response }))
}

async fn serve_image(store: &ImageStore, area: StorageArea, filename: &str) -> Result<NamedFile, ApiError> {
    let not_found = || ApiError::NotFound(format!("Image '{}' not found", filename));
    let path = store.resolve(area, filename).ok_or_else(not_found)?;
    NamedFile::open_async(path).await.map_err(|_| not_found())
}

async fn serve_upload(
    pipeline: web::Data<ScanPipeline>,
    path: web::Path<String>,
) -> Result<NamedFile, ApiError> {
    serve_image(pipeline.store(), StorageArea::Uploads, &path).await
}

async fn serve_result(
    pipeline: web::Data<ScanPipeline>,
    path: web::Path<String>,
) -> Result<NamedFile, ApiError> {
    serve_image(pipeline.store(), StorageArea::Results, &path).await
}

async fn health(
    pipeline: web::Data<ScanPipeline>,
    explainer: web::Data<ExplanationService>,
) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        models: pipeline.models().status(),
        llm_initialized: explainer.is_initialized(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
