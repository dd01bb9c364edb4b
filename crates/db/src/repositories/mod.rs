use async_trait::async_trait;
use thiserror::Error;

use shopdesk_core::domain::conversation::{
    Conversation, ConversationId, Message, NewConversation,
};
use shopdesk_core::domain::order::{NewOrder, Order, OrderId, OrderStatus};
use shopdesk_core::domain::product::{NewProduct, Product, ProductId, ProductUpdate};
use shopdesk_core::errors::DomainError;

pub mod conversation;
pub mod memory;
pub mod order;
pub mod product;
mod rows;

pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryOrderRepository, InMemoryProductRepository,
};
pub use order::SqlOrderRepository;
pub use product::SqlProductRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<DomainError> for RepositoryError {
    fn from(value: DomainError) -> Self {
        Self::Validation(value.to_string())
    }
}

/// Maps unique-constraint violations onto [`RepositoryError::Conflict`].
pub(crate) fn conflict_or_database(error: sqlx::Error, what: impl Into<String>) -> RepositoryError {
    let unique_violation =
        error.as_database_error().map(|db_error| db_error.is_unique_violation()).unwrap_or(false);
    if unique_violation {
        RepositoryError::Conflict(what.into())
    } else {
        RepositoryError::Database(error)
    }
}

/// Catalog lookups used by the chat assistant and the inventory API.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    /// Exact SKU match.
    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError>;
    /// Case-insensitive substring match over name, SKU and description.
    async fn search(&self, query: &str) -> Result<Vec<Product>, RepositoryError>;
    /// Case-insensitive category equality.
    async fn list_by_category(&self, category: &str) -> Result<Vec<Product>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError>;
    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError>;
    /// Adds `delta` to the stock level in one atomic step, stopping at zero,
    /// and recomputes the stock status.
    async fn adjust_stock(
        &self,
        id: ProductId,
        delta: i64,
    ) -> Result<Option<Product>, RepositoryError>;
    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError>;
    /// Newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Order>, RepositoryError>;
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError>;
    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError>;
}

/// Conversation store. Messages are append-only.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;
    async fn create(&self, conversation: NewConversation) -> Result<Conversation, RepositoryError>;
    /// Appends one message and bumps `updated_at`. `None` when the id is unknown.
    async fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> Result<Option<Conversation>, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<Conversation>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Conversation>, RepositoryError>;
    async fn set_active(
        &self,
        id: ConversationId,
        active: bool,
    ) -> Result<Option<Conversation>, RepositoryError>;
}
