//! Sage API - HTTP server
//!
//! Document upload, chat (full and streamed), retrieval, index info, and
//! snapshot endpoints over one shared [`sage_rag::RagEngine`].

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Headroom above the file size limit for multipart framing
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    info(title = "Sage API", description = "Retrieval-augmented question answering over uploaded documents"),
    paths(
        handlers::health::health_check,
        handlers::health::index_info,
        handlers::documents::upload_document,
        handlers::chat::chat_handler,
        handlers::chat::chat_stream_handler,
        handlers::retrieve::retrieve_handler,
        handlers::snapshot::save_snapshot,
        handlers::snapshot::load_snapshot,
    ),
    components(schemas(
        error::ApiError,
        handlers::health::HealthResponse,
        handlers::health::InfoResponse,
        handlers::documents::UploadForm,
        handlers::documents::UploadDocumentResponse,
        handlers::chat::ChatRequest,
        handlers::chat::ChatResponse,
        handlers::chat::StreamErrorEvent,
        handlers::retrieve::RetrieveRequest,
        handlers::retrieve::RetrievedChunk,
        handlers::retrieve::RetrieveResponse,
        handlers::snapshot::SnapshotResponse,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "index", description = "Index statistics"),
        (name = "documents", description = "Document ingestion"),
        (name = "chat", description = "Question answering"),
        (name = "retrieval", description = "Similarity search"),
        (name = "snapshot", description = "Index persistence"),
    )
)]
pub struct ApiDoc;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config().server;

    let mut router = Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(
            server.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(TraceLayer::new_for_http());

    if server.cors_enabled {
        router = router.layer(cors_layer(&server.cors_origins));
    }

    router.with_state(state)
}

/// Any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
