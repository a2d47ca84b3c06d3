use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing, Json, Router,
};
use chrono::{DateTime, Utc};
use nimble_blob::{BlobOrigin, BlobRecord};
use serde::Serialize;
use tracing::debug;

use crate::{ApiError, BlobState};

/// Multipart field carrying the payload
const FILE_FIELD: &str = "file";

/// Response header naming the stage that served a read
pub const ORIGIN_HEADER: &str = "x-blob-origin";

pub fn blob_routes() -> Router<BlobState> {
    Router::new()
        .route("/", routing::post(create_blob))
        .route("/{name}", routing::get(read_blob))
        .route("/{name}/status", routing::get(blob_status))
}

/// Public view of a [`BlobRecord`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobStatus {
    pub name: String,
    pub backend: String,
    pub uploaded: bool,
    pub created_at: DateTime<Utc>,
    pub uploading: bool,
}

impl From<BlobRecord> for BlobStatus {
    fn from(record: BlobRecord) -> Self {
        let uploading = record.is_uploading(Utc::now());
        Self {
            name: record.name,
            backend: record.backend,
            uploaded: record.uploaded,
            created_at: record.created_at,
            uploading,
        }
    }
}

struct Upload {
    name: Option<String>,
    content: Bytes,
}

async fn create_blob(
    State(state): State<BlobState>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> Result<StatusCode, ApiError> {
    let storage = query
        .get("storage")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing storage parameter"))?
        .to_string();

    let upload = if is_multipart(request.headers()) {
        read_multipart(request, &state).await?
    } else {
        read_raw(request, &state).await?
    };
    if upload.content.is_empty() {
        return Err(ApiError::bad_request("Missing file"));
    }

    let name = upload
        .name
        .or_else(|| query.get("name").cloned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing object name"))?;

    debug!(object = %name, %storage, size = upload.content.len(), "Blob upload received");
    state.blobs.save(&name, &storage, upload.content).await?;
    Ok(StatusCode::CREATED)
}

async fn read_blob(
    State(state): State<BlobState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let opened = state.blobs.open(&name).await?;
    let origin = match opened.origin {
        BlobOrigin::Staging => "staging",
        BlobOrigin::Remote => "remote",
    };

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::HeaderName::from_static(ORIGIN_HEADER), HeaderValue::from_static(origin)),
        ],
        opened.content,
    ))
}

async fn blob_status(
    State(state): State<BlobState>,
    Path(name): Path<String>,
) -> Result<Json<BlobStatus>, ApiError> {
    let record = state.blobs.status(&name).await?;
    Ok(Json(BlobStatus::from(record)))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn read_multipart(request: Request, state: &BlobState) -> Result<Upload, ApiError> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field.file_name().map(str::to_string);
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
        return Ok(Upload { name, content });
    }

    Err(ApiError::bad_request("Missing file field"))
}

async fn read_raw(request: Request, state: &BlobState) -> Result<Upload, ApiError> {
    let name = request
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(disposition_filename);

    let content = Bytes::from_request(request, state)
        .await
        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
    Ok(Upload { name, content })
}

/// `filename` parameter of a Content-Disposition header
fn disposition_filename(value: &HeaderValue) -> Option<String> {
    let value = value.to_str().ok()?;
    value
        .split(';')
        .map(str::trim)
        .find_map(|param| {
            let (key, raw) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("filename")
                .then(|| raw.trim().trim_matches('"').to_string())
        })
        .filter(|name| !name.is_empty())
}
