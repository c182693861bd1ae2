use crate::AppState;
use crate::api::error::AppError;
use crate::models::{EffectKind, ItemOutcome, ItemStatus, UploadedImage};
use crate::services::batch::{BatchSummary, run_batch};
use crate::utils::validation::validate_batch_len;
use axum::{
    Json,
    extract::{
        Multipart, Query, State,
        multipart::MultipartError,
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Multipart body with a single `file` part.
#[derive(ToSchema)]
pub struct ImageUpload {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Multipart body with one or more `files` parts.
#[derive(ToSchema)]
pub struct BatchImageUpload {
    #[schema(value_type = Vec<String>)]
    pub files: Vec<Vec<u8>>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ProcessedImageData {
    pub input_file_name: String,
    pub cloudinary_url: Option<String>,
    pub s3_input_url: Option<String>,
    pub s3_output_url: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ProcessImageResponse {
    pub status: ItemStatus,
    pub message: String,
    pub data: ProcessedImageData,
}

#[derive(Serialize, ToSchema)]
pub struct BatchProcessResponse {
    /// "success" when every item succeeded, "partial" when some did, "failed" otherwise
    pub status: String,
    pub message: String,
    pub summary: BatchSummary,
    pub results: Vec<ItemOutcome>,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct BatchQuery {
    /// Pipelines run at once for this request; clamped to the server maximum
    pub concurrency: Option<usize>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// Collects file parts whose field name is one of `fields`.
async fn read_uploads(
    multipart: &mut Multipart,
    fields: &[&str],
) -> Result<Vec<UploadedImage>, AppError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if !fields.contains(&name.as_str()) {
            tracing::debug!("Ignoring multipart field '{}'", name);
            continue;
        }

        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!("⚠️  Failed to read upload '{}': {}", file_name, e);
            multipart_error(e)
        })?;
        uploads.push(UploadedImage::new(file_name, bytes.to_vec()));
    }

    Ok(uploads)
}

async fn process_single(
    state: AppState,
    effect: EffectKind,
    mut multipart: Multipart,
) -> Result<Json<ProcessImageResponse>, AppError> {
    let mut uploads = read_uploads(&mut multipart, &["file"]).await?;
    let upload = match uploads.len() {
        0 => return Err(AppError::BadRequest("No file uploaded".to_string())),
        1 => uploads.remove(0),
        n => {
            return Err(AppError::BadRequest(format!(
                "Expected one file, got {}; use the batch endpoint for several",
                n
            )));
        }
    };

    let processed = state.pipeline.run(&upload, effect).await?;
    let status = processed.status();
    let message = match status {
        ItemStatus::Success => "Image processed successfully",
        _ => "Transformed image could not be retrieved",
    };

    Ok(Json(ProcessImageResponse {
        status,
        message: message.to_string(),
        data: ProcessedImageData {
            input_file_name: processed.input_file_name,
            cloudinary_url: Some(processed.transform.url),
            s3_input_url: processed.s3_input_url,
            s3_output_url: processed.s3_output_url,
        },
    }))
}

async fn process_batch(
    state: AppState,
    effect: EffectKind,
    query: BatchQuery,
    mut multipart: Multipart,
) -> Result<Json<BatchProcessResponse>, AppError> {
    let uploads = read_uploads(&mut multipart, &["files", "file"]).await?;
    validate_batch_len(uploads.len(), state.config.max_batch_files)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let concurrency = state.config.effective_concurrency(query.concurrency);
    let results = run_batch(state.pipeline.clone(), uploads, effect, concurrency).await?;
    let summary = BatchSummary::from_outcomes(&results);

    let status = if summary.succeeded == summary.total {
        "success"
    } else if summary.succeeded > 0 {
        "partial"
    } else {
        "failed"
    };

    Ok(Json(BatchProcessResponse {
        status: status.to_string(),
        message: format!(
            "Processed {} images: {} succeeded, {} failed, {} errored",
            summary.total, summary.succeeded, summary.failed, summary.errored
        ),
        summary,
        results,
    }))
}

#[utoipa::path(
    post,
    path = "/background-removal/",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image processed", body = ProcessImageResponse),
        (status = 400, description = "Missing or invalid file", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload too large", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Processing failed", body = crate::api::error::ErrorResponse)
    ),
    tag = "effects"
)]
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessImageResponse>, AppError> {
    process_single(state, EffectKind::BackgroundRemoval, multipart).await
}

#[utoipa::path(
    post,
    path = "/background-removal/batch",
    params(BatchQuery),
    request_body(content = BatchImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-image outcomes", body = BatchProcessResponse),
        (status = 400, description = "Empty or oversized batch", body = crate::api::error::ErrorResponse)
    ),
    tag = "effects"
)]
pub async fn remove_background_batch(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
    multipart: Multipart,
) -> Result<Json<BatchProcessResponse>, AppError> {
    process_batch(state, EffectKind::BackgroundRemoval, query, multipart).await
}

#[utoipa::path(
    post,
    path = "/content-aware/",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image processed", body = ProcessImageResponse),
        (status = 400, description = "Missing or invalid file", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload too large", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Processing failed", body = crate::api::error::ErrorResponse)
    ),
    tag = "effects"
)]
pub async fn content_aware(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessImageResponse>, AppError> {
    process_single(state, EffectKind::ContentAwareResize, multipart).await
}

#[utoipa::path(
    post,
    path = "/content-aware/batch",
    params(BatchQuery),
    request_body(content = BatchImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-image outcomes", body = BatchProcessResponse),
        (status = 400, description = "Empty or oversized batch", body = crate::api::error::ErrorResponse)
    ),
    tag = "effects"
)]
pub async fn content_aware_batch(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
    multipart: Multipart,
) -> Result<Json<BatchProcessResponse>, AppError> {
    process_batch(state, EffectKind::ContentAwareResize, query, multipart).await
}

#[utoipa::path(
    post,
    path = "/add-shadow/",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image processed", body = ProcessImageResponse),
        (status = 400, description = "Missing or invalid file", body = crate::api::error::ErrorResponse),
        (status = 413, description = "Upload too large", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Processing failed", body = crate::api::error::ErrorResponse)
    ),
    tag = "effects"
)]
pub async fn add_shadow(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessImageResponse>, AppError> {
    process_single(state, EffectKind::AddShadow, multipart).await
}

#[utoipa::path(
    post,
    path = "/add-shadow/batch",
    params(BatchQuery),
    request_body(content = BatchImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-image outcomes", body = BatchProcessResponse),
        (status = 400, description = "Empty or oversized batch", body = crate::api::error::ErrorResponse)
    ),
    tag = "effects"
)]
pub async fn add_shadow_batch(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
    multipart: Multipart,
) -> Result<Json<BatchProcessResponse>, AppError> {
    process_batch(state, EffectKind::AddShadow, query, multipart).await
}
