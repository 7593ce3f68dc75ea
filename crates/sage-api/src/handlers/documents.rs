//! Document upload handler

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Multipart form accepted by the upload endpoint
#[derive(ToSchema)]
pub struct UploadForm {
    /// Document file (.pdf, .docx, .txt, .md)
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Upload document response
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadDocumentResponse {
    #[schema(example = "Successfully indexed 12 chunks from lease.pdf")]
    pub message: String,
    pub filename: String,
    /// Chunks appended by this upload
    pub indexed_count: usize,
    /// Chunks stored with a zero vector after an embedding failure
    pub degraded_count: usize,
    /// Vectors in the index after this upload
    pub total_vectors: usize,
}

/// Upload, parse, chunk, and index a document
#[utoipa::path(
    post,
    path = "/api/v1/documents",
    tag = "documents",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Document indexed", body = UploadDocumentResponse),
        (status = 400, description = "Unsupported or unreadable file", body = crate::error::ApiError),
        (status = 413, description = "File too large", body = crate::error::ApiError)
    )
)]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let limit = state.config().server.max_upload_bytes;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::from_multipart(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("File part has no filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::from_multipart(e, limit))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("Missing multipart field 'file'".to_string()))?;

    if bytes.len() > limit {
        return Err(AppError::PayloadTooLarge { limit });
    }
    if !state.accepts_upload(&filename) {
        return Err(AppError::Parser(sage_parser::ParserError::UnsupportedFormat(
            filename,
        )));
    }

    tracing::info!("Processing upload {} ({} bytes)", filename, bytes.len());

    // PDF and DOCX extraction is CPU-bound
    let parse_state = Arc::clone(&state);
    let parse_name = filename.clone();
    let document = tokio::task::spawn_blocking(move || {
        parse_state.parsers.parse_bytes(&parse_name, &bytes)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Parser task failed: {e}")))??;

    if document.is_blank() {
        return Err(AppError::BadRequest(format!(
            "No text could be extracted from {filename}"
        )));
    }

    let records = state.chunker.chunk_document(&document);
    let report = state.engine.ingest(records).await?;

    Ok((
        StatusCode::OK,
        Json(UploadDocumentResponse {
            message: format!(
                "Successfully indexed {} chunks from {}",
                report.indexed_count, filename
            ),
            filename,
            indexed_count: report.indexed_count,
            degraded_count: report.degraded_count,
            total_vectors: report.total_vectors,
        }),
    ))
}
