//! Domain model, configuration and error taxonomy shared by the shopdesk crates.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::conversation::{
    Conversation, ConversationAnalytics, ConversationId, Message, NewConversation, Sender,
};
pub use domain::entity::{Entity, EntityType, FormattedEntity};
pub use domain::intent::{Intent, IntentName};
pub use domain::order::{NewOrder, Order, OrderId, OrderItem, OrderStatus, OrderSummary};
pub use domain::product::{
    InventorySummary, NewProduct, Product, ProductId, ProductUpdate, StockStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
