//! API route definitions

use crate::handlers::{chat, documents, health, retrieve, snapshot};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/info", get(health::index_info))
        // Ingestion
        .route("/documents", post(documents::upload_document))
        // Query endpoints
        .route("/chat", post(chat::chat_handler))
        .route("/chat/stream", post(chat::chat_stream_handler))
        .route("/retrieve", post(retrieve::retrieve_handler))
        // Persistence
        .route("/snapshot/save", post(snapshot::save_snapshot))
        .route("/snapshot/load", post(snapshot::load_snapshot))
}
