//! Snapshot handlers for the configured snapshot directory

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use sage_vector::SnapshotInfo;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Snapshot operation response
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotResponse {
    #[schema(example = "sage_index")]
    pub dir: String,
    pub total_vectors: usize,
    pub dimension: usize,
}

impl From<SnapshotInfo> for SnapshotResponse {
    fn from(info: SnapshotInfo) -> Self {
        Self {
            dir: info.dir.display().to_string(),
            total_vectors: info.total_vectors,
            dimension: info.dimension,
        }
    }
}

/// Persist the index and chunk store
#[utoipa::path(
    post,
    path = "/api/v1/snapshot/save",
    tag = "snapshot",
    responses(
        (status = 200, description = "Snapshot written", body = SnapshotResponse),
        (status = 500, description = "Write failed", body = crate::error::ApiError)
    )
)]
pub async fn save_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    let info = state.engine.save_snapshot().await?;
    Ok(Json(SnapshotResponse::from(info)))
}

/// Replace the live index with the saved snapshot
#[utoipa::path(
    post,
    path = "/api/v1/snapshot/load",
    tag = "snapshot",
    responses(
        (status = 200, description = "Snapshot loaded", body = SnapshotResponse),
        (status = 409, description = "Snapshot dimension differs from the embedding provider", body = crate::error::ApiError),
        (status = 422, description = "Snapshot missing or corrupt", body = crate::error::ApiError)
    )
)]
pub async fn load_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    let info = state.engine.load_snapshot().await?;
    Ok(Json(SnapshotResponse::from(info)))
}
