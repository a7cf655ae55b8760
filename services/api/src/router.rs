//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the agent endpoints and OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, HistoryMessage, HistoryResponse, QueryRequest, QueryResponse},
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
        handlers::run_query,
        handlers::run_voice_turn,
        handlers::get_history,
    ),
    components(
        schemas(QueryRequest, QueryResponse, HistoryResponse, HistoryMessage, ErrorResponse)
    ),
    tags(
        (name = "Mentor API", description = "Guided tutoring agent for text and voice turns")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/agent/query", post(handlers::run_query))
        .route("/agent/voice", post(handlers::run_voice_turn))
        .route("/agent/history/{session_id}", get(handlers::get_history))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
