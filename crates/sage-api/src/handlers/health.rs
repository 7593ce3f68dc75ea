//! Health and index info handlers

use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub version: String,
    pub name: String,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// Index statistics response
#[derive(Serialize, ToSchema)]
pub struct InfoResponse {
    /// Vectors in the index
    #[schema(example = 128)]
    pub total_vectors: usize,

    /// Embedding dimension
    #[schema(example = 1536)]
    pub embedding_dimension: usize,

    /// Generation backend
    #[schema(example = "openai")]
    pub llm: String,

    pub uptime_seconds: u64,
    pub total_requests: u64,

    /// Query embedding cache statistics, when enabled
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<sage_rag::CacheStatsReport>,
}

/// Index info
#[utoipa::path(
    get,
    path = "/api/v1/info",
    tag = "index",
    responses(
        (status = 200, description = "Index statistics", body = InfoResponse)
    )
)]
pub async fn index_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();

    let info = state.engine.info().await;
    Json(InfoResponse {
        total_vectors: info.total_vectors,
        embedding_dimension: info.embedding_dimension,
        llm: state.engine.llm_name().to_string(),
        uptime_seconds: state.uptime_secs(),
        total_requests: state.get_request_count(),
        cache: state.engine.cache_stats(),
    })
}
