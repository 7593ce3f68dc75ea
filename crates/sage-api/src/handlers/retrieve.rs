//! Retrieval handler: ranked chunks without generation

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use sage_core::RetrievalResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

/// Retrieval request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct RetrieveRequest {
    /// Search query
    #[schema(example = "capital of France")]
    pub query: String,

    /// Maximum number of chunks; the configured top-k when omitted
    #[schema(example = 4)]
    pub top_k: Option<usize>,
}

/// One retrieved chunk
#[derive(Debug, Serialize, ToSchema)]
pub struct RetrievedChunk {
    pub position: usize,
    #[schema(example = "geo.pdf")]
    pub source: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    /// L2 distance to the query, lower is closer
    #[schema(example = 0.14)]
    pub distance: f32,
}

impl From<RetrievalResult> for RetrievedChunk {
    fn from(result: RetrievalResult) -> Self {
        Self {
            position: result.chunk.position,
            source: result.chunk.source().to_string(),
            text: result.chunk.text,
            metadata: result.chunk.metadata,
            distance: result.distance,
        }
    }
}

/// Retrieval response body
#[derive(Debug, Serialize, ToSchema)]
pub struct RetrieveResponse {
    /// Chunks, nearest first
    pub results: Vec<RetrievedChunk>,
}

/// Retrieve the chunks nearest to a query
#[utoipa::path(
    post,
    path = "/api/v1/retrieve",
    tag = "retrieval",
    request_body = RetrieveRequest,
    responses(
        (status = 200, description = "Ranked chunks", body = RetrieveResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 502, description = "Embedding backend failed", body = crate::error::ApiError)
    )
)]
pub async fn retrieve_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetrieveRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    if req.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query cannot be empty".to_string()));
    }
    if req.top_k == Some(0) {
        return Err(AppError::BadRequest("top_k must be at least 1".to_string()));
    }

    let results = state.engine.retrieve(&req.query, req.top_k).await?;
    Ok(Json(RetrieveResponse {
        results: results.into_iter().map(RetrievedChunk::from).collect(),
    }))
}
