//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application: the
//! prefixed chat API, the root/health endpoints, and the OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        ChatRequest, ChatResponse, ErrorResponse, HealthResponse, ServiceInfoResponse,
        SlideContent, ThreadInfoResponse, TurnView,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::chat,
        handlers::get_thread,
        handlers::root,
        handlers::health,
    ),
    components(
        schemas(ChatRequest, ChatResponse, SlideContent, ThreadInfoResponse, TurnView, ServiceInfoResponse, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "Tutor API", description = "Conversational tutoring with structured slides")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The chat API lives under the configured prefix; root and health stay
    // at the top level.
    let api_router = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/threads/{thread_id}", get(handlers::get_thread));

    let app_router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest(&app_state.config.api_prefix, api_router)
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(app_router)
}
