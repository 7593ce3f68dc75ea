//! Chat handlers: full answers and server-sent event streams

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use sage_core::SageError;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

/// Chat request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// User's question
    #[schema(example = "What is the notice period in the lease?")]
    pub question: String,
}

/// Chat response body
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    /// Generated answer
    pub answer: String,
}

/// Payload of the `error` stream event
#[derive(Debug, Serialize, ToSchema)]
pub struct StreamErrorEvent {
    pub code: String,
    pub message: String,
    /// Answer text delivered before the failure
    pub partial: String,
}

impl From<&SageError> for StreamErrorEvent {
    fn from(err: &SageError) -> Self {
        let partial = match err {
            SageError::GenerationInterrupted { partial, .. } => partial.clone(),
            _ => String::new(),
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            partial,
        }
    }
}

/// Answer a question in one response
#[utoipa::path(
    post,
    path = "/api/v1/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Answer generated", body = ChatResponse),
        (status = 502, description = "Embedding or LLM backend failed", body = crate::error::ApiError),
        (status = 500, description = "Internal error", body = crate::error::ApiError)
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    tracing::info!("Chat request: {} chars", req.question.len());

    let answer = state.engine.answer_full(req.question).await?;
    Ok(Json(ChatResponse { answer }))
}

/// Stream an answer as server-sent events
///
/// Emits a `message` event per fragment, then `done`. A failure emits one
/// `error` event carrying the partial answer and ends the stream.
#[utoipa::path(
    post,
    path = "/api/v1/chat/stream",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Event stream of answer fragments", content_type = "text/event-stream")
    )
)]
pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    state.increment_requests();
    tracing::info!("Streaming chat request: {} chars", req.question.len());

    let answer = state.engine.answer(req.question);

    // The answer stream is dropped with the connection
    let events = stream::unfold(Some(answer), |answer| async move {
        let mut answer = answer?;
        let item = answer.next().await;
        let (event, next) = match item {
            Some(Ok(fragment)) => (message_event(&fragment), Some(answer)),
            Some(Err(e)) => (error_event(&e), None),
            None => (Event::default().event("done").data("[DONE]"), None),
        };
        Some((Ok::<_, Infallible>(event), next))
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// SSE field values cannot carry carriage returns
fn message_event(fragment: &str) -> Event {
    let data = if fragment.contains('\r') {
        fragment.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        fragment.to_string()
    };
    Event::default().event("message").data(data)
}

fn error_event(err: &SageError) -> Event {
    let payload = StreamErrorEvent::from(err);
    let data = serde_json::to_string(&payload).unwrap_or_else(|_| payload.message.clone());
    Event::default().event("error").data(data)
}
