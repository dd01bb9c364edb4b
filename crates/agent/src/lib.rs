//! Chat understanding and reply pipeline for the shopdesk assistant.
//!
//! A message goes through two stages:
//! 1. **Understanding**: intent plus entities, from the hosted model
//!    (`hosted`) or from the rule-based `intents` and `entities` modules.
//! 2. **Reply**: hosted generation or the deterministic `responses` handlers,
//!    which read the catalog and order repositories.
//!
//! `runtime::AgentRuntime` runs both stages per message, falls back stage by
//! stage when the hosted model errors or times out, and records the exchange in
//! the conversation store. Intent and entities always come from one source: if
//! either hosted understanding call fails, both are recomputed by the rules.

pub mod entities;
pub mod guardrails;
pub mod hosted;
pub mod intents;
pub mod llm;
pub mod responses;
pub mod runtime;

pub use entities::{format_entities, EntityExtractor};
pub use guardrails::MessageGuardrails;
pub use hosted::{HostedModel, HostedModelError, LlmHostedModel};
pub use intents::IntentClassifier;
pub use llm::{LlmClient, LlmError, OpenAiClient};
pub use responses::{ResponseError, ResponseGenerator};
pub use runtime::{AgentRuntime, ChatOutcome, ChatTurn, PipelinePath, StageSource};
