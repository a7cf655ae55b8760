//! API Models
//!
//! Request and response payloads for the agent endpoints, doubling as the
//! `utoipa` schema source for the OpenAPI document.

use mentor_core::state::{ChatMessage, MessageRole};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct QueryRequest {
    #[schema(example = "How does photosynthesis work?")]
    pub query: String,
    /// Conversation thread to continue. Omitted for voice devices, which use
    /// a per-user device session.
    pub session_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct QueryResponse {
    pub response: String,
    pub session_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct HistoryMessage {
    #[schema(example = "assistant")]
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for HistoryMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
