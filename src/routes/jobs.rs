use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use garde::Validate;
use image::ImageFormat;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{DownloadResponse, JobResponse};
use crate::models::job::{self, JobParams, JobStatus, NewJob};
use crate::routes::ApiError;
use crate::services::storage::BucketKind;

/// Content types accepted for upload. Checked before any blob-store or
/// job-store interaction.
const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// The authenticated principal, issued upstream. Credential validation is
/// not this service's concern; the header value is treated as an opaque
/// owner id.
fn owner_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::WebP => "webp",
        _ => "png",
    }
}

/// POST /api/v1/jobs — Upload an image and create a generation job.
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let owner = owner_from_headers(&headers)?;

    let mut file: Option<(Option<String>, String, Vec<u8>)> = None;
    let mut mode: Option<String> = None;
    let mut target_format: Option<String> = None;
    let mut max_polygons: Option<i32> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                file = Some((filename, content_type, data.to_vec()));
            }
            Some("mode") => mode = Some(field.text().await?),
            Some("target_format") => target_format = Some(field.text().await?),
            Some("max_polygons") => {
                let raw = field.text().await?;
                let parsed = raw
                    .parse::<i32>()
                    .map_err(|_| ApiError::BadRequest("max_polygons must be an integer".into()))?;
                max_polygons = Some(parsed);
            }
            _ => {}
        }
    }

    let (filename, declared_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;

    // Reject disallowed content types before touching any store: both the
    // declared type and the sniffed magic bytes must be on the allow-list.
    if !ALLOWED_CONTENT_TYPES.contains(&declared_type.as_str()) {
        return Err(ApiError::UnsupportedMediaType);
    }
    let format = image::guess_format(&data).map_err(|_| ApiError::UnsupportedMediaType)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP) {
        return Err(ApiError::UnsupportedMediaType);
    }

    let params = JobParams {
        mode: mode.unwrap_or_else(job::default_mode),
        target_format: target_format.unwrap_or_else(job::default_target_format),
        max_polygons,
    };
    params
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // Store the raw input, then the job record, then hand off to the worker
    // pool. Failures surface synchronously and abort submission.
    let input_key = format!("{}.{}", Uuid::new_v4(), extension_for(format));
    state.blobs.ensure_buckets().await?;
    state
        .blobs
        .put(BucketKind::Uploads, &input_key, &data, &declared_type)
        .await?;

    let job = state
        .jobs
        .create(NewJob {
            owner,
            input_key,
            input_filename: filename,
            mode: params.mode,
            target_format: params.target_format,
            max_polygons: params.max_polygons,
        })
        .await?;

    state.dispatcher.submit(job.id).await?;

    metrics::counter!("generation_jobs_submitted_total").increment(1);
    tracing::info!(job_id = %job.id, mode = %job.mode, target_format = %job.target_format, "job submitted");

    Ok((StatusCode::CREATED, Json(JobResponse::from(job))))
}

/// GET /api/v1/jobs/{job_id} — Owner-scoped job snapshot.
pub async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let owner = owner_from_headers(&headers)?;

    let job = state
        .jobs
        .load_owned(job_id, &owner)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(JobResponse::from(job)))
}

/// GET /api/v1/jobs/{job_id}/download — Presigned URLs for a completed job.
pub async fn download_manifest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let owner = owner_from_headers(&headers)?;

    let job = state
        .jobs
        .load_owned(job_id, &owner)
        .await?
        .ok_or(ApiError::NotFound)?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::NotCompleted);
    }

    let mut downloads = std::collections::BTreeMap::new();
    for artifact in state.jobs.artifacts(job_id).await? {
        let url = state
            .blobs
            .presign_get(BucketKind::Artifacts, &artifact.key, state.presign_ttl_secs)
            .await?;
        downloads.insert(artifact.kind, url);
    }

    Ok(Json(DownloadResponse { job_id, downloads }))
}
