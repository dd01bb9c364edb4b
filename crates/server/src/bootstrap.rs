use std::sync::Arc;
use std::time::Duration;

use shopdesk_agent::{
    AgentRuntime, EntityExtractor, IntentClassifier, LlmError, LlmHostedModel, MessageGuardrails,
    OpenAiClient, ResponseError, ResponseGenerator,
};
use shopdesk_core::config::{AppConfig, ConfigError};
use shopdesk_db::{
    connect_with_settings, migrations, DbPool, SqlConversationRepository, SqlOrderRepository,
    SqlProductRepository,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("entity patterns failed to compile: {0}")]
    Patterns(#[from] regex::Error),
    #[error("response templates failed to load: {0}")]
    Templates(#[from] ResponseError),
    #[error("hosted model client could not be built: {0}")]
    HostedModel(#[from] LlmError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let api = build_api_state(&config, db_pool.clone())?;
    Ok(Application { config, db_pool, api })
}

fn build_api_state(config: &AppConfig, db_pool: DbPool) -> Result<ApiState, BootstrapError> {
    let products = Arc::new(SqlProductRepository::new(db_pool.clone()));
    let orders = Arc::new(SqlOrderRepository::new(db_pool.clone()));
    let conversations = Arc::new(SqlConversationRepository::new(db_pool));

    let responses = ResponseGenerator::new(products.clone(), orders.clone())?;
    let mut runtime = AgentRuntime::new(
        EntityExtractor::new()?,
        IntentClassifier::new(),
        responses,
        conversations.clone(),
    )
    .with_guardrails(MessageGuardrails::from_config(&config.chat))
    .with_context_window(config.chat.context_window);

    match OpenAiClient::from_config(&config.llm)? {
        Some(client) => {
            info!(
                event_name = "system.bootstrap.hosted_model",
                correlation_id = "bootstrap",
                provider = ?config.llm.provider,
                model = %client.model(),
                endpoint = %client.endpoint(),
                "hosted model enabled"
            );
            runtime = runtime.with_hosted_model(
                Arc::new(LlmHostedModel::new(client)),
                Duration::from_secs(config.llm.timeout_secs),
            );
        }
        None => warn!(
            event_name = "system.bootstrap.hosted_model",
            correlation_id = "bootstrap",
            "hosted model disabled; replies come from the rule-based pipeline"
        ),
    }

    Ok(ApiState { runtime: Arc::new(runtime), products, orders, conversations })
}
