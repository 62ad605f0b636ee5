use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use switchboard_agent::runtime::{AgentRuntime, RuntimeError};
use switchboard_agent::DispatchReply;
use switchboard_core::domain::conversation::ConversationId;
use switchboard_core::domain::routing::RoutingDecision;
use tracing::warn;

#[derive(Clone)]
pub struct ChatState {
    runtime: AgentRuntime,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
    pub routing: RoutingDecision,
    pub success: bool,
    pub needs_clarification: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: String,
}

impl From<DispatchReply> for ChatResponse {
    fn from(reply: DispatchReply) -> Self {
        Self {
            success: reply.response.success(),
            needs_clarification: reply.response.needs_clarification(),
            error_message: reply.response.error_message().map(str::to_string),
            response: reply.rendered,
            conversation_id: reply.conversation_id.to_string(),
            routing: reply.decision,
        }
    }
}

pub fn router(runtime: AgentRuntime) -> Router {
    Router::new().route("/api/v1/chat", post(chat)).with_state(ChatState { runtime })
}

pub async fn chat(
    State(state): State<ChatState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ChatError>)> {
    let conversation_id = body
        .conversation_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(ConversationId);
    let sender_id = body.sender_id.filter(|id| !id.trim().is_empty());

    match state.runtime.handle_message(&body.message, conversation_id, sender_id).await {
        Ok(reply) => Ok(Json(reply.into())),
        Err(RuntimeError::EmptyMessage) => Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError { error: "message must not be empty".to_string() }),
        )),
        Err(error @ RuntimeError::Stopped) => {
            warn!(event_name = "http.chat.unavailable", error = %error, "chat request rejected");
            Err((StatusCode::SERVICE_UNAVAILABLE, Json(ChatError { error: error.to_string() })))
        }
    }
}
