//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling chat, thread inspection, and
//! liveness requests. It uses `utoipa` doc comments to generate OpenAPI
//! documentation.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{error, info};
use tutor_core::{session::Turn, tutor::TutorError};

use crate::{
    models::{
        ChatRequest, ChatResponse, ErrorResponse, HealthResponse, ServiceInfoResponse,
        StreamEvent, ThreadInfoResponse, TurnView,
    },
    state::AppState,
};

/// Service name reported by the root endpoint.
const SERVICE_NAME: &str = "Tutor API";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    InternalServerError(anyhow::Error),
}

impl ApiError {
    /// The message safe to expose to the caller.
    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Upstream(message) => message.clone(),
            ApiError::InternalServerError(_) => "An internal server error occurred.".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(message) => {
                error!("Upstream model failure: {}", message);
                StatusCode::BAD_GATEWAY
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = self.public_message();
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// `TutorError` carries the validation/upstream distinction; map it here
/// because the blanket `From` above would flatten it to a 500.
fn map_tutor_error(err: TutorError) -> ApiError {
    match err {
        TutorError::Validation(message) => ApiError::BadRequest(message),
        TutorError::Upstream(inner) => ApiError::Upstream(inner.to_string()),
    }
}

/// Process one chat message and return the reply with its slide.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Reply with slide and thread id", body = ChatResponse),
        (status = 400, description = "Empty or malformed message", body = ErrorResponse),
        (status = 502, description = "Model call failed", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let thread_id = state
        .sessions
        .resolve_or_create(payload.thread_id.as_deref())
        .await;
    let handle = state.sessions.thread(&thread_id).await?;

    // Hold the thread lock across the model call: requests on the same
    // thread serialize, other threads proceed independently.
    let mut thread = handle.lock().await;
    let history = thread.turns().to_vec();

    let reply = state
        .tutor
        .respond(&history, &payload.message, &state.config.course_topic)
        .await
        .map_err(map_tutor_error)?;

    // Both turns are recorded only after the model call succeeded, so a
    // failed request leaves the history untouched.
    thread.record(Turn::user(payload.message));
    thread.record(Turn::assistant(reply.message.clone()));
    let total_turns = thread.turns().len();
    drop(thread);

    info!(%thread_id, total_turns, "Chat turn completed");

    Ok(Json(ChatResponse {
        message: reply.message,
        slide: reply.slide.into(),
        thread_id,
    }))
}

/// Process one chat message, streaming the reply as newline-delimited JSON.
///
/// Chunks are emitted while the model is talking; the final
/// `response_complete` event carries the slide, which is extracted only once
/// the full reply is known.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let thread_id = state
        .sessions
        .resolve_or_create(payload.thread_id.as_deref())
        .await;

    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(16);
    let task_state = state.clone();
    let task_thread_id = thread_id.clone();
    tokio::spawn(async move {
        if let Err(err) =
            stream_chat_turn(task_state, task_thread_id, payload.message, event_tx.clone()).await
        {
            error!(error = ?err, "Streaming chat turn failed");
            let _ = event_tx
                .send(StreamEvent::Error {
                    message: err.public_message(),
                })
                .await;
        }
    });

    let body = Body::from_stream(ReceiverStream::new(event_rx).map(|event| {
        serde_json::to_string(&event).map(|mut line| {
            line.push('\n');
            line
        })
    }));

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)?;
    Ok(response)
}

/// Drives one streamed chat turn, forwarding chunks as stream events.
async fn stream_chat_turn(
    state: Arc<AppState>,
    thread_id: String,
    message: String,
    event_tx: mpsc::Sender<StreamEvent>,
) -> Result<(), ApiError> {
    let handle = state.sessions.thread(&thread_id).await?;
    let mut thread = handle.lock().await;
    let history = thread.turns().to_vec();

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(16);
    let forward_tx = event_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(chunk) = chunk_rx.recv().await {
            if forward_tx
                .send(StreamEvent::ResponseChunk { chunk })
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let reply = state
        .tutor
        .respond_streaming(&history, &message, &state.config.course_topic, chunk_tx)
        .await
        .map_err(map_tutor_error)?;

    // The chunk sender is gone once respond_streaming returns; wait for the
    // forwarder so every chunk precedes the completion event.
    forwarder.await.ok();

    thread.record(Turn::user(message));
    thread.record(Turn::assistant(reply.message.clone()));
    drop(thread);

    info!(%thread_id, "Streamed chat turn completed");

    let _ = event_tx
        .send(StreamEvent::ResponseComplete {
            message: reply.message,
            slide: reply.slide.into(),
            thread_id,
        })
        .await;
    Ok(())
}

/// Inspect a conversation thread.
#[utoipa::path(
    get,
    path = "/threads/{thread_id}",
    responses(
        (status = 200, description = "Thread metadata and turn history", body = ThreadInfoResponse),
        (status = 404, description = "Thread not found", body = ErrorResponse)
    ),
    params(
        ("thread_id" = String, Path, description = "Thread identifier")
    )
)]
pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadInfoResponse>, ApiError> {
    let handle = state
        .sessions
        .thread(&thread_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("Thread with id '{}' not found", thread_id)))?;

    let thread = handle.lock().await;
    Ok(Json(ThreadInfoResponse {
        thread_id: thread.id.clone(),
        created_at: thread.created_at,
        total_turns: thread.turns().len(),
        turns: thread.turns().iter().map(TurnView::from).collect(),
    }))
}

/// Service information.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service name, course topic, and docs path", body = ServiceInfoResponse)
    )
)]
pub async fn root(State(state): State<Arc<AppState>>) -> Json<ServiceInfoResponse> {
    Json(ServiceInfoResponse {
        message: SERVICE_NAME.to_string(),
        course: state.config.course_topic.clone(),
        docs: "/swagger-ui".to_string(),
    })
}

/// Process liveness.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
