use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use shopdesk_agent::AgentRuntime;
use shopdesk_core::errors::{ApplicationError, InterfaceError};
use shopdesk_db::{ConversationRepository, OrderRepository, ProductRepository, RepositoryError};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::{chat, conversations, inventory, orders};

/// Shared handles for the JSON API.
#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<AgentRuntime>,
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
}

/// Error body returned by every API route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ApiErrorBody>);

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/conversations", get(conversations::list_active))
        .route("/api/conversations/{id}", get(conversations::get_conversation))
        .route("/api/inventory", get(inventory::list_products).post(inventory::create_product))
        .route("/api/inventory/summary", get(inventory::summary))
        .route("/api/inventory/low-stock", get(inventory::low_stock))
        .route("/api/inventory/{id}", put(inventory::update_product))
        .route("/api/orders", get(orders::list_orders).post(orders::place_order))
        .route("/api/orders/recent", get(orders::recent_orders))
        .route("/api/orders/summary", get(orders::summary))
        .route("/api/orders/today", get(orders::today))
        .route("/api/orders/{id}/status", put(orders::update_status))
        .route("/api/analytics", get(conversations::analytics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiErrorBody { error: message.into() }))
}

pub fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Validation and conflict failures are reported to the caller; anything else
/// is logged inside the request's trace span and replaced by `fallback`.
pub fn repository_error(error: RepositoryError, fallback: &str) -> ApiError {
    match error {
        RepositoryError::Validation(message) => {
            api_error(StatusCode::BAD_REQUEST, format!("{fallback}: {message}"))
        }
        RepositoryError::Conflict(message) => {
            api_error(StatusCode::CONFLICT, format!("{fallback}: {message}"))
        }
        other => {
            error!(
                event_name = "api.repository.error",
                error = %other,
                "{fallback}"
            );
            api_error(StatusCode::INTERNAL_SERVER_ERROR, fallback)
        }
    }
}

pub fn application_error(error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    match &interface {
        InterfaceError::BadRequest { message, .. } => api_error(status, message.clone()),
        other => {
            error!(
                event_name = "api.request.failed",
                correlation_id = %other.correlation_id(),
                error = %other,
                "request failed"
            );
            api_error(status, other.user_message())
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use shopdesk_agent::{AgentRuntime, EntityExtractor, IntentClassifier, ResponseGenerator};
    use shopdesk_db::{
        InMemoryConversationRepository, InMemoryOrderRepository, InMemoryProductRepository,
        SampleDataset,
    };

    use super::ApiState;

    /// API state over in-memory stores seeded with the sample catalog.
    pub async fn seeded_state() -> ApiState {
        let products = Arc::new(InMemoryProductRepository::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let conversations = Arc::new(InMemoryConversationRepository::default());
        SampleDataset::load(products.as_ref(), orders.as_ref()).await.expect("seed sample data");

        let responses = ResponseGenerator::with_seed(products.clone(), orders.clone(), 7)
            .expect("response templates");
        let runtime = AgentRuntime::new(
            EntityExtractor::new().expect("extractor patterns"),
            IntentClassifier::new(),
            responses,
            conversations.clone(),
        );

        ApiState { runtime: Arc::new(runtime), products, orders, conversations }
    }
}
