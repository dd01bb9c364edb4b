use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shopdesk_agent::{ChatOutcome, ChatTurn};
use shopdesk_core::domain::conversation::ConversationId;
use tracing::info;

use crate::api::{api_error, application_error, correlation_id, ApiError, ApiState};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<ConversationRef>,
}

/// Browser clients send the id back either as a number or as a string.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ConversationRef {
    Number(i64),
    Text(String),
}

impl ConversationRef {
    /// A blank string means "start a new conversation".
    pub fn resolve(&self) -> Result<Option<ConversationId>, String> {
        match self {
            Self::Number(id) => Ok(Some(ConversationId(*id))),
            Self::Text(raw) if raw.trim().is_empty() => Ok(None),
            Self::Text(raw) => raw
                .trim()
                .parse::<i64>()
                .map(|id| Some(ConversationId(id)))
                .map_err(|_| format!("conversationId `{raw}` is not a number")),
        }
    }
}

pub async fn chat(
    State(state): State<ApiState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatOutcome>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        api_error(StatusCode::BAD_REQUEST, format!("Invalid chat request: {}", rejection.body_text()))
    })?;

    let conversation_id = match &request.conversation_id {
        Some(reference) => {
            reference.resolve().map_err(|message| api_error(StatusCode::BAD_REQUEST, message))?
        }
        None => None,
    };

    let correlation_id = correlation_id();
    let mut turn = ChatTurn::new(request.message).with_correlation_id(correlation_id.clone());
    if let Some(id) = conversation_id {
        turn = turn.in_conversation(id);
    }

    let outcome = state
        .runtime
        .handle_message(turn)
        .await
        .map_err(|error| application_error(error, &correlation_id))?;

    info!(
        event_name = "api.chat.replied",
        correlation_id = %correlation_id,
        conversation_id = outcome.conversation_id.0,
        intent = %outcome.intent.name,
        "chat message handled"
    );
    Ok(Json(outcome))
}
