//! JSON API handlers for submitting and managing magnet links

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use magnetdav_core::{ContentId, ContentRecord, FileEntry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::WebError;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub auth: bool,
}

#[derive(Deserialize)]
pub struct AddMagnetRequest {
    #[serde(default)]
    pub magnet_uri: String,
}

#[derive(Serialize)]
pub struct Stats {
    pub total_magnets: u64,
    pub total_files: u64,
    pub active_torrents: usize,
}

pub async fn api_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        auth: state.auth.enabled,
    })
}

/// Submits a magnet link; acquisition continues in the background.
///
/// # Errors
///
/// - `WebError::BadRequest` - If the link is empty
/// - `WebError::Lifecycle` - If the server is shutting down or the record cannot be stored
pub async fn api_add_magnet(
    State(state): State<AppState>,
    Json(request): Json<AddMagnetRequest>,
) -> Result<(StatusCode, Json<ContentRecord>), WebError> {
    let uri = request.magnet_uri.trim();
    if uri.is_empty() {
        return Err(WebError::BadRequest {
            reason: "magnet_uri is required".to_string(),
        });
    }

    let record = state.manager.submit(uri).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Lists records, most recently accessed first.
///
/// # Errors
///
/// - `WebError::Catalog` - If the catalog cannot be read
pub async fn api_magnets(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContentRecord>>, WebError> {
    Ok(Json(state.manager.catalog().list_records().await?))
}

/// Lists the catalogued files of one record in index order.
///
/// # Errors
///
/// - `WebError::ContentNotFound` - If no record exists for the id
/// - `WebError::Catalog` - If the catalog cannot be read
pub async fn api_magnet_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FileEntry>>, WebError> {
    let id = ContentId::new(id.to_lowercase());
    let catalog = state.manager.catalog();
    if catalog.get_record(&id).await?.is_none() {
        return Err(WebError::ContentNotFound { id });
    }
    Ok(Json(catalog.files_for(&id).await?))
}

/// Drops the session, record and files of one magnet link.
///
/// # Errors
///
/// - `WebError::ContentNotFound` - If nothing was stored for the id
/// - `WebError::Lifecycle` - If the record cannot be deleted
pub async fn api_remove_magnet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, WebError> {
    let id = ContentId::new(id.to_lowercase());
    if !state.manager.remove(&id).await? {
        return Err(WebError::ContentNotFound { id });
    }

    info!("Removed {} via API", id);
    Ok(Json(json!({ "message": "Magnet removed successfully" })))
}

/// Catalog counts and live session count.
///
/// # Errors
///
/// - `WebError::Lifecycle` - If the counts cannot be read
pub async fn api_stats(State(state): State<AppState>) -> Result<Json<Stats>, WebError> {
    let stats = state.manager.stats().await?;
    Ok(Json(Stats {
        total_magnets: stats.total_records,
        total_files: stats.total_files,
        active_torrents: stats.active_sessions,
    }))
}
