use std::sync::Arc;

use shopdesk_agent::{
    AgentRuntime, ChatOutcome, ChatTurn, EntityExtractor, IntentClassifier, MessageGuardrails,
    ResponseGenerator,
};
use shopdesk_core::config::AppConfig;
use shopdesk_db::{DbPool, SqlConversationRepository, SqlOrderRepository, SqlProductRepository};

use crate::commands::{
    block_on, load_config, open_migrated_pool, CommandResult, Failure, EXIT_CONFIG, EXIT_PIPELINE,
};

/// Sends one message through the rule-based pipeline against the configured
/// database. The exchange is stored as a new conversation.
pub fn run(message: &str) -> CommandResult {
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on("ask", async {
        let pool = open_migrated_pool(&config).await?;
        let outcome = answer(&config, pool.clone(), message).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(Ok(outcome)) => CommandResult::success("ask", render_outcome(&outcome)),
        Ok(Err(failure)) => CommandResult::from_failure("ask", failure),
        Err(result) => result,
    }
}

async fn answer(config: &AppConfig, pool: DbPool, message: &str) -> Result<ChatOutcome, Failure> {
    let products = Arc::new(SqlProductRepository::new(pool.clone()));
    let orders = Arc::new(SqlOrderRepository::new(pool.clone()));
    let conversations = Arc::new(SqlConversationRepository::new(pool));

    let responses = ResponseGenerator::new(products, orders)
        .map_err(|error| ("pipeline_init", error.to_string(), EXIT_CONFIG))?;
    let extractor =
        EntityExtractor::new().map_err(|error| ("pipeline_init", error.to_string(), EXIT_CONFIG))?;
    let runtime = AgentRuntime::new(extractor, IntentClassifier::new(), responses, conversations)
        .with_guardrails(MessageGuardrails::from_config(&config.chat))
        .with_context_window(config.chat.context_window);

    runtime
        .handle_message(ChatTurn::new(message).with_correlation_id("cli-ask"))
        .await
        .map_err(|error| ("pipeline", error.to_string(), EXIT_PIPELINE))
}

fn render_outcome(outcome: &ChatOutcome) -> String {
    format!(
        "[{} {:.2}] {}",
        outcome.intent.name, outcome.intent.confidence, outcome.message.content
    )
}
