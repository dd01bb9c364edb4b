use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    Json,
};
use shopdesk_core::domain::conversation::{Conversation, ConversationAnalytics, ConversationId};

use crate::api::{api_error, repository_error, ApiError, ApiState};

pub async fn list_active(
    State(state): State<ApiState>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state
        .conversations
        .list_active()
        .await
        .map_err(|error| repository_error(error, "Error fetching conversations"))?;
    Ok(Json(conversations))
}

pub async fn get_conversation(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Conversation>, ApiError> {
    let Path(id) = id.map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid conversation id"))?;

    state
        .conversations
        .find_by_id(ConversationId(id))
        .await
        .map_err(|error| repository_error(error, "Error fetching conversation"))?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Conversation not found"))
}

/// Usage numbers are computed from the stored conversations on each call.
pub async fn analytics(
    State(state): State<ApiState>,
) -> Result<Json<ConversationAnalytics>, ApiError> {
    let conversations = state
        .conversations
        .list_all()
        .await
        .map_err(|error| repository_error(error, "Error fetching analytics"))?;

    if conversations.is_empty() {
        return Err(api_error(StatusCode::NOT_FOUND, "No analytics data found"));
    }
    Ok(Json(ConversationAnalytics::from_conversations(&conversations)))
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        Json,
    };
    use shopdesk_agent::ChatTurn;

    use super::{analytics, get_conversation, list_active};
    use crate::api::test_support::seeded_state;

    #[tokio::test]
    async fn analytics_is_not_found_before_any_chat() {
        let state = seeded_state().await;

        let (status, Json(body)) = analytics(State(state)).await.expect_err("no conversations");

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "No analytics data found");
    }

    #[tokio::test]
    async fn analytics_counts_user_intents_and_conversation_states() {
        let state = seeded_state().await;
        let first = state.runtime.handle_message(ChatTurn::new("hello")).await.expect("greeting");
        state
            .runtime
            .handle_message(ChatTurn::new("bye").in_conversation(first.conversation_id))
            .await
            .expect("goodbye");
        let second = state.runtime.handle_message(ChatTurn::new("help")).await.expect("help");
        state
            .conversations
            .set_active(second.conversation_id, false)
            .await
            .expect("deactivate")
            .expect("known conversation");

        let Json(report) = analytics(State(state)).await.expect("analytics");

        assert_eq!(report.active_conversations, 1);
        assert_eq!(report.completed_conversations, 1);
        assert_eq!(report.total_messages, 6);
        assert_eq!(report.intent_counts.get("greeting"), Some(&1));
        assert_eq!(report.intent_counts.get("goodbye"), Some(&1));
        assert_eq!(report.intent_counts.get("help"), Some(&1));
    }

    #[tokio::test]
    async fn active_list_and_lookup_reflect_the_store() {
        let state = seeded_state().await;
        let outcome = state.runtime.handle_message(ChatTurn::new("hello")).await.expect("greeting");

        let Json(active) = list_active(State(state.clone())).await.expect("list");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, outcome.conversation_id);

        let Json(found) = get_conversation(State(state.clone()), Ok(Path(outcome.conversation_id.0)))
            .await
            .expect("lookup");
        assert_eq!(found.messages.len(), 2);

        let (status, Json(body)) =
            get_conversation(State(state), Ok(Path(999))).await.expect_err("missing");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Conversation not found");
    }
}
