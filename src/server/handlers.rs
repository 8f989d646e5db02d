use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::engine::{list_files, DownloadRequest, Task};
use crate::media::{MediaInfo, ProbeOutcome};
use anyhow::Context;
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::info;

/// Body of `POST /api/extract`. Full download requests are accepted too;
/// only the URL is used.
#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub task_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FolderListing {
    pub folder: String,
    pub files: Vec<String>,
}

/// GET /healthz
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/extract
///
/// Always answers with a media summary. When probing fails the summary is
/// an empty placeholder.
pub async fn extract_info(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Json<MediaInfo> {
    let outcome = if req.url.trim().is_empty() {
        ProbeOutcome::degraded("URL is required")
    } else {
        state.engine.probe(&req.url).await
    };
    if let ProbeOutcome::Degraded { reason, .. } = &outcome {
        info!("Returning placeholder media info for {}: {}", req.url, reason);
    }
    Json(outcome.into_info())
}

/// POST /api/queue-download
pub async fn queue_download(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> ApiResult<Json<QueuedResponse>> {
    let task_id = state.engine.begin_task(req)?;
    Ok(Json(QueuedResponse {
        task_id,
        status: "queued",
    }))
}

/// GET /api/status/:task_id
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    state
        .engine
        .get_status(&task_id)
        .map(Json)
        .ok_or(ApiError::NotFound("Task not found"))
}

/// GET /api/file/:file_id
pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    serve_output(&state, &file_id, request).await
}

/// GET /api/file/:folder/:file
pub async fn get_folder_file(
    State(state): State<AppState>,
    Path((folder, file)): Path<(String, String)>,
    request: Request,
) -> ApiResult<Response> {
    serve_output(&state, &format!("{folder}/{file}"), request).await
}

async fn serve_output(state: &AppState, id: &str, request: Request) -> ApiResult<Response> {
    let path = state
        .engine
        .resolve_output_path(id)
        .await
        .ok_or(ApiError::NotFound("File not found"))?;

    let metadata = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;

    if metadata.is_dir() {
        let files = list_files(&path)
            .await
            .with_context(|| format!("Failed to list {}", path.display()))?;
        return Ok(Json(FolderListing {
            folder: id.to_string(),
            files,
        })
        .into_response());
    }

    info!("Serving {}", path.display());
    send_attachment(path, request).await
}

async fn send_attachment(path: PathBuf, request: Request) -> ApiResult<Response> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "_"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
