//! Per-message chat pipeline.
//!
//! Each message first tries the hosted model for understanding (intent and
//! entities together) and again for the reply. Any hosted failure or timeout
//! drops that stage to the rule-based components; intent and entities always
//! come from the same source.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use shopdesk_core::domain::conversation::{ConversationId, Message, NewConversation};
use shopdesk_core::domain::entity::FormattedEntity;
use shopdesk_core::domain::intent::Intent;
use shopdesk_core::errors::{ApplicationError, DomainError};
use shopdesk_db::repositories::{ConversationRepository, RepositoryError};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::entities::{format_entities, EntityExtractor};
use crate::guardrails::MessageGuardrails;
use crate::hosted::{HostedModel, HostedModelError, RESPONSE_CONTEXT_MESSAGES};
use crate::intents::IntentClassifier;
use crate::responses::{ResponseError, ResponseGenerator};

pub const DEFAULT_HOSTED_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatTurn {
    pub message: String,
    /// Unknown ids start a new conversation.
    pub conversation_id: Option<ConversationId>,
    pub correlation_id: Option<String>,
}

impl ChatTurn {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), conversation_id: None, correlation_id: None }
    }

    pub fn in_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSource {
    Hosted,
    Fallback,
}

/// Which source served each stage of one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PipelinePath {
    pub understanding: StageSource,
    pub response: StageSource,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutcome {
    pub message: Message,
    pub intent: Intent,
    pub entities: Vec<FormattedEntity>,
    pub conversation_id: ConversationId,
    #[serde(skip)]
    pub path: PipelinePath,
}

#[derive(Debug, Error)]
enum HostedFailure {
    #[error(transparent)]
    Model(#[from] HostedModelError),
    #[error("hosted model timed out after {0:?}")]
    TimedOut(Duration),
}

pub struct AgentRuntime {
    extractor: EntityExtractor,
    classifier: IntentClassifier,
    responses: ResponseGenerator,
    conversations: Arc<dyn ConversationRepository>,
    hosted: Option<Arc<dyn HostedModel>>,
    hosted_timeout: Duration,
    guardrails: MessageGuardrails,
    context_window: usize,
}

impl AgentRuntime {
    pub fn new(
        extractor: EntityExtractor,
        classifier: IntentClassifier,
        responses: ResponseGenerator,
        conversations: Arc<dyn ConversationRepository>,
    ) -> Self {
        Self {
            extractor,
            classifier,
            responses,
            conversations,
            hosted: None,
            hosted_timeout: DEFAULT_HOSTED_TIMEOUT,
            guardrails: MessageGuardrails::default(),
            context_window: RESPONSE_CONTEXT_MESSAGES,
        }
    }

    pub fn with_hosted_model(mut self, hosted: Arc<dyn HostedModel>, limit: Duration) -> Self {
        self.hosted = Some(hosted);
        self.hosted_timeout = limit;
        self
    }

    pub fn with_guardrails(mut self, guardrails: MessageGuardrails) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window.max(1);
        self
    }

    pub fn has_hosted_model(&self) -> bool {
        self.hosted.is_some()
    }

    /// Runs one message through the pipeline and records the exchange.
    ///
    /// The user and bot messages are appended one after the other; a failure
    /// between the two leaves the user message without a reply.
    pub async fn handle_message(&self, turn: ChatTurn) -> Result<ChatOutcome, ApplicationError> {
        let correlation_id = turn.correlation_id.as_deref().unwrap_or("unassigned");
        self.guardrails.check(&turn.message)?;

        let (intent, entities, understanding) = self.understand(&turn.message, correlation_id).await;
        debug!(
            event_name = "chat.pipeline.classified",
            correlation_id,
            intent = %intent.name,
            confidence = intent.confidence,
            entity_count = entities.len(),
            source = ?understanding,
        );

        let conversation = match turn.conversation_id {
            Some(id) => {
                let found = self.conversations.find_by_id(id).await.map_err(persistence)?;
                if found.is_none() {
                    warn!(
                        event_name = "chat.conversation.unknown",
                        correlation_id,
                        conversation_id = id.0,
                        "conversation not found; starting a new one"
                    );
                }
                found
            }
            None => None,
        };

        let user_message =
            Message::user(turn.message.as_str(), intent.name, entities.clone(), Utc::now());
        let prior = conversation
            .as_ref()
            .map(|conversation| conversation.recent_messages(self.context_window))
            .unwrap_or(&[]);

        let (reply, response) =
            self.respond(&intent, &entities, prior, &user_message, correlation_id).await?;
        let bot_message = Message::bot(reply, intent.name, Utc::now());

        let conversation_id = match conversation {
            Some(conversation) => {
                self.append(conversation.id, user_message).await?;
                self.append(conversation.id, bot_message.clone()).await?;
                conversation.id
            }
            None => {
                let created = self
                    .conversations
                    .create(NewConversation {
                        user_id: None,
                        intent: Some(intent.name),
                        messages: vec![user_message, bot_message.clone()],
                        active: true,
                    })
                    .await
                    .map_err(persistence)?;
                created.id
            }
        };

        let path = PipelinePath { understanding, response };
        info!(
            event_name = "chat.pipeline.responded",
            correlation_id,
            conversation_id = conversation_id.0,
            intent = %intent.name,
            understanding = ?path.understanding,
            response = ?path.response,
            "chat message handled"
        );

        Ok(ChatOutcome { message: bot_message, intent, entities, conversation_id, path })
    }

    async fn understand(
        &self,
        text: &str,
        correlation_id: &str,
    ) -> (Intent, Vec<FormattedEntity>, StageSource) {
        if let Some(hosted) = &self.hosted {
            let (intent, entities) = tokio::join!(
                self.bounded(hosted.analyze_intent(text)),
                self.bounded(hosted.extract_entities(text)),
            );
            match (intent, entities) {
                (Ok(intent), Ok(entities)) => return (intent, entities, StageSource::Hosted),
                (Err(error), _) | (_, Err(error)) => {
                    warn!(
                        event_name = "chat.pipeline.fallback",
                        correlation_id,
                        stage = "understanding",
                        error = %error,
                        "hosted understanding failed; using rule-based classifier and extractor"
                    );
                }
            }
        }

        let intent = self.classifier.classify(text);
        let entities = format_entities(&self.extractor.extract_entities(text));
        (intent, entities, StageSource::Fallback)
    }

    async fn respond(
        &self,
        intent: &Intent,
        entities: &[FormattedEntity],
        prior: &[Message],
        current: &Message,
        correlation_id: &str,
    ) -> Result<(String, StageSource), ApplicationError> {
        if let Some(hosted) = &self.hosted {
            let mut context = prior.to_vec();
            context.push(current.clone());
            match self.bounded(hosted.generate_response(intent, entities, &context)).await {
                Ok(reply) => return Ok((reply, StageSource::Hosted)),
                Err(error) => {
                    warn!(
                        event_name = "chat.pipeline.fallback",
                        correlation_id,
                        stage = "response",
                        error = %error,
                        "hosted response failed; using rule-based generator"
                    );
                }
            }
        }

        let reply =
            self.responses.generate_response(intent, entities, prior).await.map_err(|error| {
                match error {
                    ResponseError::Repository(error) => persistence(error),
                    ResponseError::Template(error) => {
                        ApplicationError::Configuration(error.to_string())
                    }
                }
            })?;
        Ok((reply, StageSource::Fallback))
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, HostedFailure>
    where
        F: std::future::Future<Output = Result<T, HostedModelError>>,
    {
        match timeout(self.hosted_timeout, call).await {
            Ok(result) => result.map_err(HostedFailure::from),
            Err(_) => Err(HostedFailure::TimedOut(self.hosted_timeout)),
        }
    }

    async fn append(&self, id: ConversationId, message: Message) -> Result<(), ApplicationError> {
        match self.conversations.append_message(id, message).await.map_err(persistence)? {
            Some(_) => Ok(()),
            None => Err(DomainError::NotFound { entity: "conversation", key: id.0.to_string() }
                .into()),
        }
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::Validation(message) => DomainError::InvariantViolation(message).into(),
        other => ApplicationError::Persistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use shopdesk_core::domain::conversation::{
        Conversation, ConversationId, Message, NewConversation, Sender,
    };
    use shopdesk_core::domain::entity::{EntityType, FormattedEntity};
    use shopdesk_core::domain::intent::{Intent, IntentName};
    use shopdesk_core::errors::{ApplicationError, DomainError};
    use shopdesk_db::fixtures::SampleDataset;
    use shopdesk_db::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryOrderRepository,
        InMemoryProductRepository, RepositoryError,
    };

    use super::{AgentRuntime, ChatTurn, StageSource};
    use crate::entities::{format_entities, EntityExtractor};
    use crate::guardrails::MessageGuardrails;
    use crate::hosted::{HostedModel, HostedModelError};
    use crate::intents::IntentClassifier;
    use crate::responses::{ResponseGenerator, GREETINGS};

    #[derive(Default)]
    struct FakeHosted {
        intent: Option<Intent>,
        entities: Option<Vec<FormattedEntity>>,
        reply: Option<String>,
        delay: Option<Duration>,
        contexts: Mutex<Vec<Vec<Message>>>,
    }

    fn scripted_failure() -> HostedModelError {
        HostedModelError::InvalidPayload("scripted failure".to_string())
    }

    impl FakeHosted {
        async fn pause(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl HostedModel for FakeHosted {
        async fn analyze_intent(&self, _text: &str) -> Result<Intent, HostedModelError> {
            self.pause().await;
            self.intent.ok_or_else(scripted_failure)
        }

        async fn extract_entities(
            &self,
            _text: &str,
        ) -> Result<Vec<FormattedEntity>, HostedModelError> {
            self.pause().await;
            self.entities.clone().ok_or_else(scripted_failure)
        }

        async fn generate_response(
            &self,
            _intent: &Intent,
            _entities: &[FormattedEntity],
            recent_messages: &[Message],
        ) -> Result<String, HostedModelError> {
            self.contexts.lock().expect("lock").push(recent_messages.to_vec());
            self.pause().await;
            self.reply.clone().ok_or_else(scripted_failure)
        }
    }

    struct OfflineConversations;

    fn offline() -> RepositoryError {
        RepositoryError::Decode("conversation store offline".to_string())
    }

    #[async_trait]
    impl ConversationRepository for OfflineConversations {
        async fn find_by_id(
            &self,
            _id: ConversationId,
        ) -> Result<Option<Conversation>, RepositoryError> {
            Err(offline())
        }

        async fn create(
            &self,
            _conversation: NewConversation,
        ) -> Result<Conversation, RepositoryError> {
            Err(offline())
        }

        async fn append_message(
            &self,
            _id: ConversationId,
            _message: Message,
        ) -> Result<Option<Conversation>, RepositoryError> {
            Err(offline())
        }

        async fn list_active(&self) -> Result<Vec<Conversation>, RepositoryError> {
            Err(offline())
        }

        async fn list_all(&self) -> Result<Vec<Conversation>, RepositoryError> {
            Err(offline())
        }

        async fn set_active(
            &self,
            _id: ConversationId,
            _active: bool,
        ) -> Result<Option<Conversation>, RepositoryError> {
            Err(offline())
        }
    }

    struct Harness {
        runtime: AgentRuntime,
        conversations: Arc<InMemoryConversationRepository>,
    }

    async fn harness(hosted: Option<Arc<FakeHosted>>) -> Harness {
        let products = Arc::new(InMemoryProductRepository::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        SampleDataset::load(products.as_ref(), orders.as_ref()).await.expect("seed");
        let conversations = Arc::new(InMemoryConversationRepository::default());

        let responses =
            ResponseGenerator::with_seed(products, orders, 11).expect("response generator");
        let mut runtime = AgentRuntime::new(
            EntityExtractor::new().expect("extractor"),
            IntentClassifier::new(),
            responses,
            conversations.clone(),
        );
        if let Some(hosted) = hosted {
            runtime = runtime.with_hosted_model(hosted, Duration::from_millis(200));
        }
        Harness { runtime, conversations }
    }

    fn expected_fallback(text: &str) -> (Intent, Vec<FormattedEntity>) {
        let extractor = EntityExtractor::new().expect("extractor");
        (IntentClassifier::new().classify(text), format_entities(&extractor.extract_entities(text)))
    }

    #[tokio::test]
    async fn new_conversation_records_both_messages() {
        let harness = harness(None).await;

        let outcome =
            harness.runtime.handle_message(ChatTurn::new("hello")).await.expect("handled");

        assert_eq!(outcome.intent.name, IntentName::Greeting);
        assert!((0.5..=1.0).contains(&outcome.intent.confidence));
        assert!(GREETINGS.contains(&outcome.message.content.as_str()));
        assert_eq!(outcome.message.sender, Sender::Bot);
        assert_eq!(outcome.path.understanding, StageSource::Fallback);
        assert_eq!(outcome.path.response, StageSource::Fallback);

        let stored = harness
            .conversations
            .find_by_id(outcome.conversation_id)
            .await
            .expect("lookup")
            .expect("conversation stored");
        assert!(stored.active);
        assert_eq!(stored.intent, Some(IntentName::Greeting));
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].sender, Sender::User);
        assert_eq!(stored.messages[0].content, "hello");
        assert_eq!(stored.messages[1], outcome.message);
    }

    #[tokio::test]
    async fn follow_up_turns_append_in_arrival_order() {
        let harness = harness(None).await;
        let first =
            harness.runtime.handle_message(ChatTurn::new("hello")).await.expect("first turn");

        let second = harness
            .runtime
            .handle_message(
                ChatTurn::new("do you have SAM-GA14-KE in stock")
                    .in_conversation(first.conversation_id),
            )
            .await
            .expect("second turn");

        assert_eq!(second.conversation_id, first.conversation_id);
        assert_eq!(second.intent.name, IntentName::InventoryCheck);
        assert_eq!(
            second.entities,
            vec![FormattedEntity { entity: EntityType::Sku, value: "SAM-GA14-KE".to_string() }]
        );
        assert!(second.message.content.contains("Galaxy Tab A14"));
        assert!(second.message.content.contains("In Stock: 12"));

        let stored = harness
            .conversations
            .find_by_id(first.conversation_id)
            .await
            .expect("lookup")
            .expect("stored");
        let senders = stored.messages.iter().map(|message| message.sender).collect::<Vec<_>>();
        assert_eq!(senders, vec![Sender::User, Sender::Bot, Sender::User, Sender::Bot]);
        assert_eq!(stored.messages[2].entities.as_deref(), Some(second.entities.as_slice()));
    }

    #[tokio::test]
    async fn unknown_conversation_ids_start_a_new_conversation() {
        let harness = harness(None).await;

        let outcome = harness
            .runtime
            .handle_message(ChatTurn::new("help").in_conversation(ConversationId(404)))
            .await
            .expect("handled");

        assert_ne!(outcome.conversation_id, ConversationId(404));
        let stored =
            harness.conversations.find_by_id(outcome.conversation_id).await.expect("lookup");
        assert_eq!(stored.map(|conversation| conversation.messages.len()), Some(2));
    }

    #[tokio::test]
    async fn order_lookup_miss_echoes_the_number() {
        let harness = harness(None).await;

        let outcome = harness
            .runtime
            .handle_message(ChatTurn::new("what's the status of order #99999"))
            .await
            .expect("handled");

        assert_eq!(outcome.intent.name, IntentName::OrderStatus);
        assert!(outcome.entities.contains(&FormattedEntity {
            entity: EntityType::OrderNumber,
            value: "99999".to_string()
        }));
        assert!(outcome.message.content.contains("#99999"), "{}", outcome.message.content);
        assert!(outcome.message.content.contains("couldn't find"));
    }

    #[tokio::test]
    async fn oversized_messages_are_rejected_before_any_work() {
        let harness = harness(None).await;
        let runtime = harness.runtime.with_guardrails(MessageGuardrails::new(5));

        let error = runtime.handle_message(ChatTurn::new("hello there")).await.expect_err("limit");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
        assert!(harness.conversations.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn hosted_model_serves_both_stages_when_healthy() {
        let hosted = Arc::new(FakeHosted {
            intent: Some(Intent::new(IntentName::OrderStatus, 0.93)),
            entities: Some(vec![FormattedEntity {
                entity: EntityType::OrderNumber,
                value: "38290".to_string(),
            }]),
            reply: Some("Your order is being processed.".to_string()),
            ..FakeHosted::default()
        });
        let harness = harness(Some(hosted.clone())).await;

        let outcome = harness
            .runtime
            .handle_message(ChatTurn::new("where's my stuff? 38290"))
            .await
            .expect("handled");

        assert_eq!(outcome.intent, Intent::new(IntentName::OrderStatus, 0.93));
        assert_eq!(outcome.entities.len(), 1);
        assert_eq!(outcome.message.content, "Your order is being processed.");
        assert_eq!(outcome.path.understanding, StageSource::Hosted);
        assert_eq!(outcome.path.response, StageSource::Hosted);

        let contexts = hosted.contexts.lock().expect("lock").clone();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].len(), 1);
        assert_eq!(contexts[0][0].content, "where's my stuff? 38290");
    }

    #[tokio::test]
    async fn failed_intent_analysis_falls_back_for_intent_and_entities() {
        let text = "do you have SAM-GA14-KE in stock";
        let hosted = Arc::new(FakeHosted {
            intent: None,
            entities: Some(vec![FormattedEntity {
                entity: EntityType::CustomerName,
                value: "Jane".to_string(),
            }]),
            reply: Some("hosted reply".to_string()),
            ..FakeHosted::default()
        });
        let harness = harness(Some(hosted)).await;

        let outcome = harness.runtime.handle_message(ChatTurn::new(text)).await.expect("handled");

        let (intent, entities) = expected_fallback(text);
        assert_eq!(outcome.intent, intent);
        assert_eq!(outcome.entities, entities);
        assert_eq!(outcome.path.understanding, StageSource::Fallback);
        assert_eq!(outcome.path.response, StageSource::Hosted);
    }

    #[tokio::test]
    async fn failed_entity_extraction_discards_the_hosted_intent() {
        let text = "thanks, goodbye";
        let hosted = Arc::new(FakeHosted {
            intent: Some(Intent::new(IntentName::Help, 0.99)),
            entities: None,
            reply: Some("hosted reply".to_string()),
            ..FakeHosted::default()
        });
        let harness = harness(Some(hosted)).await;

        let outcome = harness.runtime.handle_message(ChatTurn::new(text)).await.expect("handled");

        assert_eq!(outcome.intent.name, IntentName::Goodbye);
        assert_eq!(outcome.path.understanding, StageSource::Fallback);
    }

    #[tokio::test]
    async fn failed_reply_generation_uses_rule_based_reply() {
        let hosted = Arc::new(FakeHosted {
            intent: Some(Intent::new(IntentName::InventoryCheck, 0.9)),
            entities: Some(vec![FormattedEntity {
                entity: EntityType::Sku,
                value: "WH-APM-200".to_string(),
            }]),
            reply: None,
            ..FakeHosted::default()
        });
        let harness = harness(Some(hosted)).await;

        let outcome = harness
            .runtime
            .handle_message(ChatTurn::new("stock for the audiopeak?"))
            .await
            .expect("handled");

        assert_eq!(outcome.path.understanding, StageSource::Hosted);
        assert_eq!(outcome.path.response, StageSource::Fallback);
        assert!(outcome.message.content.contains("Low Stock: 3"), "{}", outcome.message.content);
    }

    #[tokio::test]
    async fn slow_hosted_calls_time_out_into_the_fallback() {
        let hosted = Arc::new(FakeHosted {
            intent: Some(Intent::new(IntentName::Help, 0.9)),
            entities: Some(Vec::new()),
            reply: Some("too late".to_string()),
            delay: Some(Duration::from_secs(30)),
            ..FakeHosted::default()
        });
        let harness = harness(Some(hosted)).await;

        let outcome = harness.runtime.handle_message(ChatTurn::new("hello")).await.expect("handled");

        assert_eq!(outcome.intent.name, IntentName::Greeting);
        assert_eq!(outcome.path.understanding, StageSource::Fallback);
        assert_eq!(outcome.path.response, StageSource::Fallback);
        assert!(GREETINGS.contains(&outcome.message.content.as_str()));
    }

    #[tokio::test]
    async fn hosted_context_is_bounded_to_recent_messages() {
        let hosted = Arc::new(FakeHosted {
            intent: Some(Intent::new(IntentName::GeneralInquiry, 1.0)),
            entities: Some(Vec::new()),
            reply: Some("ok".to_string()),
            ..FakeHosted::default()
        });
        let harness = harness(Some(hosted.clone())).await;
        let runtime = harness.runtime.with_context_window(3);

        let first = runtime.handle_message(ChatTurn::new("one")).await.expect("first");
        for text in ["two", "three", "four"] {
            runtime
                .handle_message(ChatTurn::new(text).in_conversation(first.conversation_id))
                .await
                .expect("turn");
        }

        let contexts = hosted.contexts.lock().expect("lock").clone();
        let last = contexts.last().expect("context recorded");
        let contents = last.iter().map(|message| message.content.as_str()).collect::<Vec<_>>();
        assert_eq!(contents, vec!["ok", "three", "ok", "four"]);
    }

    #[tokio::test]
    async fn storage_failures_surface_as_persistence_errors() {
        let products = Arc::new(InMemoryProductRepository::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let runtime = AgentRuntime::new(
            EntityExtractor::new().expect("extractor"),
            IntentClassifier::new(),
            ResponseGenerator::with_seed(products, orders, 1).expect("generator"),
            Arc::new(OfflineConversations),
        );

        let error = runtime.handle_message(ChatTurn::new("hello")).await.expect_err("offline");

        assert!(matches!(error, ApplicationError::Persistence(ref message) if message.contains("offline")));
    }
}
