use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use shopdesk_core::domain::conversation::{
    Conversation, ConversationId, Message, NewConversation,
};
use shopdesk_core::domain::order::{NewOrder, Order, OrderId, OrderStatus};
use shopdesk_core::domain::product::{NewProduct, Product, ProductId, ProductUpdate};

use super::{ConversationRepository, OrderRepository, ProductRepository, RepositoryError};

/// Rows keyed by a monotonically increasing integer id, starting at 1.
#[derive(Debug)]
struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { next_id: 1, rows: BTreeMap::new() }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<Table<Product>>,
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.rows.get(&id.0).cloned())
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.rows.values().find(|product| product.sku == sku).cloned())
    }

    async fn search(&self, query: &str) -> Result<Vec<Product>, RepositoryError> {
        let needle = query.to_lowercase();
        let products = self.products.read().await;
        Ok(products
            .rows
            .values()
            .filter(|product| {
                contains_ignore_case(&product.name, &needle)
                    || contains_ignore_case(&product.sku, &needle)
                    || product
                        .description
                        .as_deref()
                        .is_some_and(|description| contains_ignore_case(description, &needle))
            })
            .cloned()
            .collect())
    }

    async fn list_by_category(&self, category: &str) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products
            .rows
            .values()
            .filter(|product| {
                product
                    .category
                    .as_deref()
                    .is_some_and(|value| value.to_lowercase() == category.to_lowercase())
            })
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.rows.values().cloned().collect())
    }

    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        product.validate()?;
        let mut products = self.products.write().await;
        if products.rows.values().any(|existing| existing.sku == product.sku) {
            return Err(RepositoryError::Conflict(format!("sku `{}` already exists", product.sku)));
        }
        let id = products.allocate_id();
        let product = product.into_product(ProductId(id), Utc::now());
        products.rows.insert(id, product.clone());
        Ok(product)
    }

    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        update.validate()?;
        let mut products = self.products.write().await;
        let Some(product) = products.rows.get_mut(&id.0) else {
            return Ok(None);
        };
        update.apply_to(product, Utc::now());
        Ok(Some(product.clone()))
    }

    async fn adjust_stock(
        &self,
        id: ProductId,
        delta: i64,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut products = self.products.write().await;
        let Some(product) = products.rows.get_mut(&id.0) else {
            return Ok(None);
        };
        let quantity = product.quantity.saturating_add(delta).max(0);
        product.set_quantity(quantity, Utc::now());
        Ok(Some(product.clone()))
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut products = self.products.write().await;
        Ok(products.rows.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Table<Order>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.rows.get(&id.0).cloned())
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.rows.values().find(|order| order.order_number == order_number).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.rows.values().cloned().collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut recent: Vec<Order> = orders.rows.values().cloned().collect();
        recent.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.0.cmp(&left.id.0))
        });
        recent.truncate(limit);
        Ok(recent)
    }

    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        order.validate()?;
        let mut orders = self.orders.write().await;
        if orders.rows.values().any(|existing| existing.order_number == order.order_number) {
            return Err(RepositoryError::Conflict(format!(
                "order number `{}` already exists",
                order.order_number
            )));
        }
        let id = orders.allocate_id();
        let order = order.into_order(OrderId(id), Utc::now());
        orders.rows.insert(id, order.clone());
        Ok(order)
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.rows.get_mut(&id.0) else {
            return Ok(None);
        };
        order.status = status;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<Table<Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.rows.get(&id.0).cloned())
    }

    async fn create(&self, conversation: NewConversation) -> Result<Conversation, RepositoryError> {
        conversation.validate()?;
        let mut conversations = self.conversations.write().await;
        let id = conversations.allocate_id();
        let conversation = conversation.into_conversation(ConversationId(id), Utc::now());
        conversations.rows.insert(id, conversation.clone());
        Ok(conversation)
    }

    async fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> Result<Option<Conversation>, RepositoryError> {
        message.validate()?;
        let mut conversations = self.conversations.write().await;
        let Some(conversation) = conversations.rows.get_mut(&id.0) else {
            return Ok(None);
        };
        conversation.messages.push(message);
        conversation.updated_at = Utc::now();
        Ok(Some(conversation.clone()))
    }

    async fn list_active(&self) -> Result<Vec<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.rows.values().filter(|conversation| conversation.active).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.rows.values().cloned().collect())
    }

    async fn set_active(
        &self,
        id: ConversationId,
        active: bool,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let Some(conversation) = conversations.rows.get_mut(&id.0) else {
            return Ok(None);
        };
        conversation.active = active;
        conversation.updated_at = Utc::now();
        Ok(Some(conversation.clone()))
    }
}
