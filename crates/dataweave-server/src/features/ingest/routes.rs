use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use dataweave_ingest::process_file;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::IngestState;
use crate::error::AppError;

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

const FILE_FIELD: &str = "file";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub detail: String,
}

pub fn ingest_routes() -> Router<IngestState> {
    Router::new()
        .route("/ingest", post(ingest_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Publish every record of an uploaded file
///
/// # Response
///
/// - `200 OK` - `{"detail": "File ingested successfully with N records."}`
/// - `400 Bad Request` - Missing `file` part or a content type other than `application/json`
/// - `500 Internal Server Error` - The file could not be read or a record could not be published
#[tracing::instrument(skip(state, multipart), fields(queue = %state.queue))]
async fn ingest_file(
    State(state): State<IngestState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    let bad_request = |e: axum::extract::multipart::MultipartError| AppError::BadRequest(e.body_text());

    while let Some(mut field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        if field.content_type() != Some(JSON_CONTENT_TYPE) {
            return Err(AppError::BadRequest(
                "Invalid file type. Please upload a JSON file.".to_string(),
            ));
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let staged = NamedTempFile::new()?;
        let mut out = tokio::fs::File::from_std(staged.reopen()?);
        let mut bytes = 0usize;
        while let Some(chunk) = field.chunk().await.map_err(bad_request)? {
            bytes += chunk.len();
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        drop(out);

        tracing::info!(%filename, bytes, "Upload staged");

        let total_records = process_file(staged.path(), &state.queue, state.sink.as_ref()).await?;

        return Ok(Json(IngestResponse {
            detail: format!("File ingested successfully with {} records.", total_records),
        }));
    }

    Err(AppError::BadRequest(format!("Missing '{}' field", FILE_FIELD)))
}
