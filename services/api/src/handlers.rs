//! Axum Handlers for the Agent API
//!
//! Text turns, voice turns, and transcript readback. Identity arrives as an
//! `x-user-id` header (with an optional `x-user-name`); authentication proper
//! is handled upstream. Voice devices have no session id of their own, so
//! each user gets one stable device session derived from their id.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use mentor_core::classifiers;
use mentor_core::state::UserRef;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    models::{ErrorResponse, HistoryResponse, QueryRequest, QueryResponse},
    speech,
    state::AppState,
    tts,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
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

fn identity(headers: &HeaderMap) -> Result<UserRef, ApiError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))?;
    let user_name = headers
        .get("x-user-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    Ok(UserRef::new(user_id, user_name))
}

/// The stable session every voice turn for a user lands in.
fn device_session_id(user_id: &str) -> String {
    format!("device_session_id_{user_id}")
}

/// Run one text turn of the tutoring dialog.
#[utoipa::path(
    post,
    path = "/agent/query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "The agent's reply", body = QueryResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user"),
        ("x-user-name" = Option<String>, Header, description = "The user's display name")
    )
)]
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if payload.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    let user = identity(&headers)?;
    let session_id = payload
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| device_session_id(&user.id));

    let response = state.runner.run_turn(user, &session_id, &payload.query).await?;
    Ok(Json(QueryResponse {
        response,
        session_id,
    }))
}

/// Run one voice turn: transcribe, answer, and stream spoken audio back.
#[utoipa::path(
    post,
    path = "/agent/voice",
    request_body(content = String, content_type = "audio/wav", description = "Raw audio bytes"),
    responses(
        (status = 200, description = "Streamed spoken reply as audio/mpeg"),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user"),
        ("x-user-name" = Option<String>, Header, description = "The user's display name")
    )
)]
pub async fn run_voice_turn(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("audio body must not be empty".to_string()));
    }
    let user = identity(&headers)?;
    let session_id = device_session_id(&user.id);

    let transcript = state.speech.transcribe(body).await?;
    info!(language = %transcript.language_code, "transcribed voice turn");
    let language = transcript.language_code.clone();

    // Synthesize a short acknowledgement concurrently with the turn itself,
    // so the device has something to play while the model thinks.
    let filler = {
        let mut rng = rand::rng();
        classifiers::pick_filler_phrase(&transcript.text, &mut rng)
    };
    let filler_task = tokio::spawn({
        let speech = state.speech.clone();
        let language = language.clone();
        async move { speech.synthesize(filler, &language).await }
    });

    let mut response = state
        .runner
        .run_turn(user, &session_id, &transcript.text)
        .await?;

    // The model answers in the default language; speak back in the language
    // the learner used.
    if language != speech::DEFAULT_LANGUAGE {
        response = state
            .speech
            .translate(&response, speech::DEFAULT_LANGUAGE, &language)
            .await?;
    }

    let filler_audio = filler_task.await.map_err(anyhow::Error::from)??;
    let main_audio = tts::synthesize_stream(state.speech.clone(), response, language);
    let audio = stream::once(async move { Ok(filler_audio) }).chain(main_audio);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(audio))
        .map_err(anyhow::Error::from)?;
    Ok(response)
}

/// Read back the conversation transcript for a session.
#[utoipa::path(
    get,
    path = "/agent/history/{session_id}",
    responses(
        (status = 200, description = "The session transcript", body = HistoryResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("session_id" = String, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let _user = identity(&headers)?;

    let session = state
        .store
        .load_state(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session '{session_id}' not found")))?;

    Ok(Json(HistoryResponse {
        session_id,
        messages: session.message_log.iter().map(Into::into).collect(),
    }))
}
