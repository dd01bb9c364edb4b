//! Hosted language-model capabilities: intent analysis, entity extraction and
//! reply generation. Every operation fails independently; callers fall back to
//! the rule-based pipeline on any error.

use async_trait::async_trait;
use serde_json::Value;
use shopdesk_core::domain::conversation::{Message, Sender};
use shopdesk_core::domain::entity::{EntityType, FormattedEntity};
use shopdesk_core::domain::intent::{Intent, IntentName};
use thiserror::Error;

use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError};

/// Prior messages sent along with a reply request.
pub const RESPONSE_CONTEXT_MESSAGES: usize = 5;

pub const EMPTY_COMPLETION_REPLY: &str =
    "I'm not sure how to respond to that. Can you please rephrase your question?";

const RESPONSE_MAX_TOKENS: u32 = 500;

const INTENT_SYSTEM_PROMPT: &str = "\
You are an intent classifier for a business management assistant focused on inventory and order management.
Analyze the user's message to determine their intent and assign a confidence score.
Respond with JSON in this format: { \"name\": \"intent_name\", \"confidence\": confidence_score }

Possible intents:
- greeting: Hello, hi, etc.
- inventory_check: Queries about current inventory levels, stock status
- inventory_restock: Requests to restock or questions about when items return to stock
- order_status: Questions about an order's current status
- order_placement: Requests to buy or order products
- product_inquiry: Questions about specific products
- returns_refunds: Inquiries about returning products or getting refunds
- help: Requests for help or assistance with the system
- goodbye: Farewell messages, closing the conversation
- general_inquiry: General questions not fitting other categories";

const ENTITY_SYSTEM_PROMPT: &str = "\
You are an entity extraction system for a business management assistant.
Analyze the user's message to identify and extract relevant entities.
Respond with JSON in this format: { \"entities\": [{ \"entity\": \"entity_type\", \"value\": \"extracted_value\" }] }

Entity types to extract:
- product: Names of products mentioned
- quantity: Numerical quantities mentioned
- sku: Product SKU or product codes
- date: Dates mentioned in any format
- order_number: Order reference numbers
- customer_name: Names of customers
- category: Product categories mentioned

Only extract entities that are explicitly mentioned. Do not infer entities.
If no entities are found, return an empty list.";

const RESPONSE_TIPS: &str = "\
Tips for responding:
- Use natural, conversational language that's friendly and helpful
- For product inquiries, include details like price, availability, and description
- For order status requests, provide tracking details if available
- For inventory checks, be specific about quantities and restocking dates
- For low stock or out-of-stock items, suggest alternatives if available
- Keep responses concise but informative
- If you need more information to fulfill a request, ask specific follow-up questions

If you're not sure how to respond, offer to connect the user with customer service.";

#[derive(Debug, Error)]
pub enum HostedModelError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("hosted model returned an invalid payload: {0}")]
    InvalidPayload(String),
}

impl HostedModelError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::Llm(LlmError::QuotaExceeded(_)))
    }
}

#[async_trait]
pub trait HostedModel: Send + Sync {
    async fn analyze_intent(&self, text: &str) -> Result<Intent, HostedModelError>;

    async fn extract_entities(&self, text: &str)
        -> Result<Vec<FormattedEntity>, HostedModelError>;

    /// `recent_messages` may hold the full history; only the last
    /// [`RESPONSE_CONTEXT_MESSAGES`] are sent.
    async fn generate_response(
        &self,
        intent: &Intent,
        entities: &[FormattedEntity],
        recent_messages: &[Message],
    ) -> Result<String, HostedModelError>;
}

pub struct LlmHostedModel<C> {
    client: C,
}

impl<C> LlmHostedModel<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C> HostedModel for LlmHostedModel<C>
where
    C: LlmClient,
{
    async fn analyze_intent(&self, text: &str) -> Result<Intent, HostedModelError> {
        let content = self
            .client
            .complete(CompletionRequest {
                messages: vec![ChatMessage::system(INTENT_SYSTEM_PROMPT), ChatMessage::user(text)],
                json_response: true,
                max_tokens: None,
            })
            .await?;
        parse_intent(&content)
    }

    async fn extract_entities(
        &self,
        text: &str,
    ) -> Result<Vec<FormattedEntity>, HostedModelError> {
        let content = self
            .client
            .complete(CompletionRequest {
                messages: vec![ChatMessage::system(ENTITY_SYSTEM_PROMPT), ChatMessage::user(text)],
                json_response: true,
                max_tokens: None,
            })
            .await?;
        parse_entities(&content)
    }

    async fn generate_response(
        &self,
        intent: &Intent,
        entities: &[FormattedEntity],
        recent_messages: &[Message],
    ) -> Result<String, HostedModelError> {
        let mut messages = vec![ChatMessage::system(response_system_prompt(intent, entities)?)];
        let start = recent_messages.len().saturating_sub(RESPONSE_CONTEXT_MESSAGES);
        messages.extend(recent_messages[start..].iter().map(|message| match message.sender {
            Sender::User => ChatMessage::user(message.content.clone()),
            Sender::Bot => ChatMessage::assistant(message.content.clone()),
        }));

        let content = self
            .client
            .complete(CompletionRequest {
                messages,
                json_response: false,
                max_tokens: Some(RESPONSE_MAX_TOKENS),
            })
            .await?;

        if content.trim().is_empty() {
            return Ok(EMPTY_COMPLETION_REPLY.to_string());
        }
        Ok(content)
    }
}

fn response_system_prompt(
    intent: &Intent,
    entities: &[FormattedEntity],
) -> Result<String, HostedModelError> {
    let entities = serde_json::to_string(entities)
        .map_err(|error| HostedModelError::InvalidPayload(error.to_string()))?;
    Ok(format!(
        "You are a helpful virtual assistant for a business focused on inventory and order management.\n\
         The user's intent has been classified as \"{}\" with confidence {}.\n\
         The following entities have been extracted: {entities}\n\n{RESPONSE_TIPS}",
        intent.name, intent.confidence
    ))
}

fn parse_intent(content: &str) -> Result<Intent, HostedModelError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|error| HostedModelError::InvalidPayload(format!("intent json: {error}")))?;

    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HostedModelError::InvalidPayload("intent name is missing".to_string()))?;
    let name: IntentName =
        name.parse().map_err(|error| HostedModelError::InvalidPayload(format!("{error}")))?;

    let confidence = value.get("confidence").and_then(Value::as_f64).ok_or_else(|| {
        HostedModelError::InvalidPayload("intent confidence is not a number".to_string())
    })?;

    Ok(Intent::new(name, confidence))
}

fn parse_entities(content: &str) -> Result<Vec<FormattedEntity>, HostedModelError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|error| HostedModelError::InvalidPayload(format!("entity json: {error}")))?;

    let items: &[Value] = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(object) => match object.get("entities") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    Ok(items.iter().filter_map(parse_entity).collect())
}

fn parse_entity(item: &Value) -> Option<FormattedEntity> {
    let entity = item.get("entity")?.as_str()?.parse::<EntityType>().ok()?;
    let value = match item.get("value")? {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    Some(FormattedEntity { entity, value })
}
