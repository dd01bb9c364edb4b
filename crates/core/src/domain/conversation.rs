use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entity::FormattedEntity;
use crate::domain::intent::IntentName;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One chat turn. Immutable once appended to a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<FormattedEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentName>,
}

impl Message {
    pub fn user(
        content: impl Into<String>,
        intent: IntentName,
        entities: Vec<FormattedEntity>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: Sender::User,
            content: content.into(),
            timestamp,
            entities: Some(entities),
            intent: Some(intent),
        }
    }

    pub fn bot(content: impl Into<String>, intent: IntentName, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: Sender::Bot,
            content: content.into(),
            timestamp,
            entities: None,
            intent: Some(intent),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::InvariantViolation("message id is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: Option<i64>,
    pub intent: Option<IntentName>,
    pub messages: Vec<Message>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// The last `limit` messages in arrival order.
    pub fn recent_messages(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewConversation {
    pub user_id: Option<i64>,
    pub intent: Option<IntentName>,
    pub messages: Vec<Message>,
    pub active: bool,
}

impl NewConversation {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.messages.iter().try_for_each(Message::validate)
    }

    pub fn into_conversation(self, id: ConversationId, now: DateTime<Utc>) -> Conversation {
        Conversation {
            id,
            user_id: self.user_id,
            intent: self.intent,
            messages: self.messages,
            active: self.active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Chat usage derived from stored conversations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAnalytics {
    pub intent_counts: BTreeMap<String, usize>,
    pub active_conversations: usize,
    pub completed_conversations: usize,
    pub total_messages: usize,
}

impl ConversationAnalytics {
    pub fn from_conversations(conversations: &[Conversation]) -> Self {
        let mut analytics = Self::default();
        for conversation in conversations {
            if conversation.active {
                analytics.active_conversations += 1;
            } else {
                analytics.completed_conversations += 1;
            }
            analytics.total_messages += conversation.messages.len();
            let user_intents = conversation
                .messages
                .iter()
                .filter(|message| message.sender == Sender::User)
                .filter_map(|message| message.intent);
            for intent in user_intents {
                *analytics.intent_counts.entry(intent.as_str().to_string()).or_default() += 1;
            }
        }
        analytics
    }
}
