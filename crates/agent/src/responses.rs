//! Deterministic reply synthesis, one handler per intent.
//!
//! Handlers only read from the catalog and order repositories. Lookup misses
//! produce clarification replies; only repository and template failures are
//! errors.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use shopdesk_core::domain::conversation::Message;
use shopdesk_core::domain::entity::{first_value, EntityType, FormattedEntity};
use shopdesk_core::domain::intent::{Intent, IntentName};
use shopdesk_core::domain::order::OrderStatus;
use shopdesk_core::domain::product::{Product, StockStatus};
use shopdesk_db::repositories::{OrderRepository, ProductRepository, RepositoryError};
use tera::{Context, Tera};
use thiserror::Error;

/// Units promised for a scheduled restock.
pub const RESTOCK_SHIPMENT_UNITS: i64 = 15;

pub const GREETINGS: [&str; 3] = [
    "Hello! I'm your BusinessAI Assistant. How can I help you today?",
    "Hi there! I'm ready to assist with inventory management, customer support, and sales. What do you need?",
    "Welcome! How may I assist you with your business needs today?",
];

pub const FAREWELLS: [&str; 3] = [
    "Thank you for using BusinessAI Assistant. Have a great day!",
    "Goodbye! Feel free to return if you need any more assistance.",
    "Thanks for chatting. I'm here whenever you need help with your business needs.",
];

pub const RETURNS_POLICY_REPLY: &str = "Our return policy allows returns within 30 days of purchase with the original receipt. To initiate a return or request a refund, please provide your order number and the reason for the return.";

pub const HELP_REPLY: &str = "I can assist you with various business tasks. Here are some things you can ask me:

- Check inventory for specific products
- Get information about product restocking
- Check the status of an order
- Get detailed product information
- Learn about our return and refund policies

How can I help you today?";

pub const GENERAL_REPLY: &str = "I'm your BusinessAI Assistant, designed to help with inventory management, customer support, and sales assistance. I can check product availability, provide order status updates, answer product questions, and much more. What business task can I help you with today?";

const PRODUCT_LIST_TEMPLATE: &str = "product_list.html";
const PRODUCT_LIST_SOURCE: &str = r#"<div class="mt-3 space-y-2">
{%- for product in products %}
  <div class="bg-white p-2 rounded border border-gray-200">
    <div class="flex justify-between">
      <span class="font-medium text-sm">{{ product.name }}</span>
      <span class="{{ product.status_class }} text-sm">{{ product.status_line }}</span>
    </div>
    <p class="text-xs text-gray-500">SKU: {{ product.sku }}</p>
  </div>
{%- endfor %}
</div>"#;

const RESTOCK_DATE_FORMAT: &str = "%A, %b %-d";
const SHORT_DATE_FORMAT: &str = "%m/%d/%Y";

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("reply template failed: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Serialize)]
struct ProductListing<'a> {
    name: &'a str,
    sku: &'a str,
    status_line: String,
    status_class: &'static str,
}

pub struct ResponseGenerator {
    products: Arc<dyn ProductRepository>,
    orders: Arc<dyn OrderRepository>,
    templates: Tera,
    rng: Mutex<StdRng>,
}

impl ResponseGenerator {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
    ) -> Result<Self, ResponseError> {
        Self::with_rng(products, orders, StdRng::from_entropy())
    }

    /// Seeded variant so greeting and farewell picks are reproducible.
    pub fn with_seed(
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
        seed: u64,
    ) -> Result<Self, ResponseError> {
        Self::with_rng(products, orders, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
        rng: StdRng,
    ) -> Result<Self, ResponseError> {
        let mut templates = Tera::default();
        templates.add_raw_template(PRODUCT_LIST_TEMPLATE, PRODUCT_LIST_SOURCE)?;
        Ok(Self { products, orders, templates, rng: Mutex::new(rng) })
    }

    /// Rule-based replies do not depend on conversation history; `_context`
    /// mirrors the hosted generator's inputs.
    pub async fn generate_response(
        &self,
        intent: &Intent,
        entities: &[FormattedEntity],
        _context: &[Message],
    ) -> Result<String, ResponseError> {
        match intent.name {
            IntentName::Greeting => Ok(self.pick(&GREETINGS).to_string()),
            IntentName::InventoryCheck => self.inventory_check(entities).await,
            IntentName::InventoryRestock => self.inventory_restock(entities).await,
            IntentName::OrderStatus => self.order_status(entities).await,
            IntentName::ProductInquiry => self.product_inquiry(entities).await,
            IntentName::ReturnsRefunds => Ok(RETURNS_POLICY_REPLY.to_string()),
            IntentName::Help => Ok(HELP_REPLY.to_string()),
            IntentName::Goodbye => Ok(self.pick(&FAREWELLS).to_string()),
            IntentName::OrderPlacement | IntentName::GeneralInquiry => {
                Ok(GENERAL_REPLY.to_string())
            }
        }
    }

    /// Renders the markup block listing name, SKU and stock status.
    pub fn render_product_list(&self, products: &[Product]) -> Result<String, ResponseError> {
        let listings = products
            .iter()
            .map(|product| ProductListing {
                name: &product.name,
                sku: &product.sku,
                status_line: status_line(product),
                status_class: status_class(product.status),
            })
            .collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("products", &listings);
        Ok(self.templates.render(PRODUCT_LIST_TEMPLATE, &context)?)
    }

    async fn inventory_check(&self, entities: &[FormattedEntity]) -> Result<String, ResponseError> {
        let (products, term) = if let Some(sku) = first_value(entities, EntityType::Sku) {
            let product = self.products.find_by_sku(&sku.to_ascii_uppercase()).await?;
            (product.into_iter().collect::<Vec<_>>(), Some(sku))
        } else if let Some(name) = first_value(entities, EntityType::Product) {
            (self.products.search(name).await?, Some(name))
        } else if let Some(category) = first_value(entities, EntityType::Category) {
            (self.products.list_by_category(category).await?, Some(category))
        } else {
            (self.products.list_all().await?, None)
        };

        if products.is_empty() {
            return Ok(match term {
                Some(term) => format!(
                    "I couldn't find any products matching \"{term}\". Could you provide more details or check the spelling?"
                ),
                None => "I couldn't find any products in our inventory. Could you provide more details or check the spelling?"
                    .to_string(),
            });
        }

        let noun = if products.len() == 1 { "product" } else { "products" };
        Ok(format!(
            "I found {} {noun} in our inventory:\n\n{}\n\nWould you like to place an order or get more information about any of these products?",
            products.len(),
            self.render_product_list(&products)?
        ))
    }

    async fn inventory_restock(
        &self,
        entities: &[FormattedEntity],
    ) -> Result<String, ResponseError> {
        let Some(product) = self.resolve_product(entities).await? else {
            return Ok("I couldn't find the specific product you're asking about. Could you provide the product name or SKU?".to_string());
        };

        let reply = match (product.status, product.next_restock) {
            (StockStatus::InStock | StockStatus::LowStock, _) => {
                let level =
                    if product.status == StockStatus::InStock { "in stock" } else { "low in stock" };
                format!(
                    "{} ({}) is currently {level} with {} units available. No restock is currently scheduled.",
                    product.name, product.sku, product.quantity
                )
            }
            (StockStatus::OutOfStock, Some(restock)) => format!(
                "I checked our system and the {} ({}) is scheduled to be back in stock by {}. We'll be receiving a shipment of {RESTOCK_SHIPMENT_UNITS} units.\n\nWould you like me to notify you when they're available?",
                product.name,
                product.sku,
                restock.format(RESTOCK_DATE_FORMAT)
            ),
            (StockStatus::OutOfStock, None) => format!(
                "{} ({}) is currently out of stock. Unfortunately, we don't have a confirmed restock date yet. Would you like me to notify you when we have more information?",
                product.name, product.sku
            ),
        };
        Ok(reply)
    }

    async fn order_status(&self, entities: &[FormattedEntity]) -> Result<String, ResponseError> {
        let Some(order_number) = first_value(entities, EntityType::OrderNumber) else {
            return Ok("To check an order status, please provide your order number. For example, 'What's the status of order #38291?'".to_string());
        };

        let Some(order) = self.orders.find_by_number(order_number).await? else {
            return Ok(format!(
                "I couldn't find an order with number #{order_number}. Please check the number and try again."
            ));
        };

        Ok(format!(
            "Order #{} {}. This order was placed on {} with a total of {}.\n\nCan I help you with anything else regarding this order?",
            order.order_number,
            order_status_phrase(&order.status),
            order.created_at.format(SHORT_DATE_FORMAT),
            money(order.total)
        ))
    }

    async fn product_inquiry(&self, entities: &[FormattedEntity]) -> Result<String, ResponseError> {
        let Some(product) = self.resolve_product(entities).await? else {
            return Ok("I couldn't find specific information about that product. Could you provide more details or ask about a different product?".to_string());
        };

        let description = product
            .description
            .as_deref()
            .filter(|description| !description.trim().is_empty())
            .unwrap_or("No detailed description available.");
        let availability = match product.status {
            StockStatus::InStock => format!("In stock ({} units available)", product.quantity),
            StockStatus::LowStock => format!("Low stock ({} units available)", product.quantity),
            StockStatus::OutOfStock => "Out of stock".to_string(),
        };

        let mut reply = format!(
            "Here's information about {} ({}):\n\n{description}\n\nPrice: {}\nAvailability: {availability}",
            product.name,
            product.sku,
            money(product.price)
        );
        if let (StockStatus::OutOfStock, Some(restock)) = (product.status, product.next_restock) {
            reply.push_str(&format!("\nExpected restock: {}", restock.format(SHORT_DATE_FORMAT)));
        }
        reply.push_str("\n\nWould you like to know more or place an order for this product?");
        Ok(reply)
    }

    /// SKU lookup first, then the first name search hit.
    async fn resolve_product(
        &self,
        entities: &[FormattedEntity],
    ) -> Result<Option<Product>, RepositoryError> {
        if let Some(sku) = first_value(entities, EntityType::Sku) {
            return self.products.find_by_sku(&sku.to_ascii_uppercase()).await;
        }
        if let Some(name) = first_value(entities, EntityType::Product) {
            return Ok(self.products.search(name).await?.into_iter().next());
        }
        Ok(None)
    }

    fn pick(&self, pool: &[&'static str]) -> &'static str {
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        let index = rng.gen_range(0..pool.len());
        pool[index]
    }
}

fn status_line(product: &Product) -> String {
    match product.status {
        StockStatus::InStock => format!("In Stock: {}", product.quantity),
        StockStatus::LowStock => format!("Low Stock: {}", product.quantity),
        StockStatus::OutOfStock => "Out of Stock".to_string(),
    }
}

fn status_class(status: StockStatus) -> &'static str {
    match status {
        StockStatus::InStock => "text-green-600",
        StockStatus::LowStock => "text-amber-600",
        StockStatus::OutOfStock => "text-red-600",
    }
}

fn order_status_phrase(status: &OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "has been received and is pending processing",
        OrderStatus::Processing => "is currently being processed",
        OrderStatus::Completed => "has been completed",
        OrderStatus::Shipped => "has been shipped and is on its way to you",
        OrderStatus::Cancelled => "has been cancelled",
        OrderStatus::Other(_) => "is being processed",
    }
}

fn money(amount: Decimal) -> String {
    format!("${:.2}", amount)
}
