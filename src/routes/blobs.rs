//! Upload and download routes for bodies and files
//!
//! Content goes to the blob store first; the record pointing at it is then
//! written through the collection's store like any other mutation.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use crate::auth::CurrentUser;
use crate::entities::{snippet, Blob, BlobChanges, NewBlob};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{Collection, EntityStore};

use super::collections;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Bodies and files share one record shape
pub trait BlobCollection: Collection<Record = Blob, New = NewBlob, Changes = BlobChanges> {}

impl<C> BlobCollection for C where C: Collection<Record = Blob, New = NewBlob, Changes = BlobChanges> {}

/// Create a blob collection router
pub fn router<C: BlobCollection>(max_upload_bytes: usize) -> Router<AppState> {
    collections::router::<C>()
        .route("/upload", post(upload::<C>))
        .route("/:uri", get(download::<C>).put(replace::<C>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Uploaded multipart file
struct Upload {
    name: String,
    content_type: String,
    data: Vec<u8>,
}

/// Take the first `file` (or `blob`) field of a multipart body
async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Failed to read multipart field: {}", e);
        AppError::BadRequest(format!("Failed to read upload: {}", e))
    })? {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name != "file" && field_name != "blob" {
            tracing::debug!("Skipping multipart field '{}'", field_name);
            continue;
        }

        let name = field.file_name().unwrap_or("unnamed").to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?;

        return Ok(Upload {
            name,
            content_type,
            data: data.to_vec(),
        });
    }

    Err(AppError::BadRequest(
        "No file provided. Use field name 'file'".to_string(),
    ))
}

async fn upload<C: BlobCollection>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Blob>)> {
    let upload = read_upload(multipart).await?;
    let stored = state.blobs().put(&upload.data).await?;

    let new = NewBlob {
        snippet: snippet(&upload.content_type, &upload.data),
        hash: stored.hash,
        name: upload.name,
        path: stored.path,
        size: stored.size,
        content_type: upload.content_type,
    };

    let blob = EntityStore::<C>::new(state.db(), state.timeouts())
        .create(&user, &new)
        .await?;

    tracing::debug!(
        entity = C::ENTITY.table(),
        uri = %blob.uri,
        size = blob.size,
        "Uploaded blob"
    );

    Ok((StatusCode::CREATED, Json(blob)))
}

/// Replace the content of a live blob, keeping its uri and name
async fn replace<C: BlobCollection>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(uri): Path<String>,
    multipart: Multipart,
) -> Result<Json<Blob>> {
    let upload = read_upload(multipart).await?;
    let stored = state.blobs().put(&upload.data).await?;

    let changes = BlobChanges {
        uri,
        snippet: snippet(&upload.content_type, &upload.data),
        hash: stored.hash,
        path: stored.path,
        size: stored.size,
    };

    let blob = EntityStore::<C>::new(state.db(), state.timeouts())
        .update(&user, &changes)
        .await?;

    Ok(Json(blob))
}

/// Serve the content of a live blob; axum answers HEAD from the same handler
async fn download<C: BlobCollection>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(uri): Path<String>,
) -> Result<Response> {
    let blob = EntityStore::<C>::new(state.db(), state.timeouts())
        .get(&user, &uri)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found: {}", C::ENTITY.table(), uri)))?;

    let data = state.blobs().get(&blob.path).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &blob.content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", blob.name.replace('"', "")),
        )
        .header(header::ETAG, format!("\"{}\"", blob.hash))
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}
