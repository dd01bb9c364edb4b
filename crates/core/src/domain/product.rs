use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const DEFAULT_REORDER_POINT: i64 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// Stock status implied by an on-hand quantity and its reorder point.
    pub fn from_levels(quantity: i64, reorder_point: i64) -> Self {
        if quantity <= 0 {
            Self::OutOfStock
        } else if quantity <= reorder_point {
            Self::LowStock
        } else {
            Self::InStock
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::LowStock => "low_stock",
            Self::OutOfStock => "out_of_stock",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in_stock" => Ok(Self::InStock),
            "low_stock" => Ok(Self::LowStock),
            "out_of_stock" => Ok(Self::OutOfStock),
            other => Err(DomainError::InvariantViolation(format!("unknown stock status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub quantity: i64,
    pub status: StockStatus,
    pub category: Option<String>,
    pub reorder_point: i64,
    pub next_restock: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Sets the on-hand quantity and recomputes the stock status.
    pub fn set_quantity(&mut self, quantity: i64, now: DateTime<Utc>) {
        self.quantity = quantity;
        self.status = StockStatus::from_levels(self.quantity, self.reorder_point);
        self.updated_at = now;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reorder_point: Option<i64>,
    #[serde(default)]
    pub next_restock: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation("product name is required".to_string()));
        }
        if self.sku.trim().is_empty() {
            return Err(DomainError::InvariantViolation("product sku is required".to_string()));
        }
        if self.price.is_sign_negative() {
            return Err(DomainError::InvariantViolation(
                "product price must not be negative".to_string(),
            ));
        }
        if self.quantity < 0 {
            return Err(DomainError::InvariantViolation(
                "product quantity must not be negative".to_string(),
            ));
        }
        if self.reorder_point.is_some_and(|point| point < 0) {
            return Err(DomainError::InvariantViolation(
                "product reorder point must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_product(self, id: ProductId, now: DateTime<Utc>) -> Product {
        let reorder_point = self.reorder_point.unwrap_or(DEFAULT_REORDER_POINT);
        Product {
            id,
            status: StockStatus::from_levels(self.quantity, reorder_point),
            name: self.name,
            sku: self.sku,
            description: self.description,
            price: self.price,
            quantity: self.quantity,
            category: self.category,
            reorder_point,
            next_restock: self.next_restock,
            image_url: self.image_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial product update. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub quantity: Option<i64>,
    pub category: Option<String>,
    pub reorder_point: Option<i64>,
    pub next_restock: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

impl ProductUpdate {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.as_ref().is_some_and(|name| name.trim().is_empty()) {
            return Err(DomainError::InvariantViolation("product name must not be blank".to_string()));
        }
        if self.price.is_some_and(|price| price.is_sign_negative()) {
            return Err(DomainError::InvariantViolation(
                "product price must not be negative".to_string(),
            ));
        }
        if self.quantity.is_some_and(|quantity| quantity < 0) {
            return Err(DomainError::InvariantViolation(
                "product quantity must not be negative".to_string(),
            ));
        }
        if self.reorder_point.is_some_and(|point| point < 0) {
            return Err(DomainError::InvariantViolation(
                "product reorder point must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply_to(self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = Some(description);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(category) = self.category {
            product.category = Some(category);
        }
        if let Some(reorder_point) = self.reorder_point {
            product.reorder_point = reorder_point;
        }
        if let Some(next_restock) = self.next_restock {
            product.next_restock = Some(next_restock);
        }
        if let Some(image_url) = self.image_url {
            product.image_url = Some(image_url);
        }
        let quantity = self.quantity.unwrap_or(product.quantity);
        product.set_quantity(quantity, now);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total_products: usize,
    pub in_stock: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub average_stock: Decimal,
}

impl InventorySummary {
    pub fn from_products(products: &[Product]) -> Self {
        let mut summary = Self { total_products: products.len(), ..Self::default() };
        for product in products {
            match product.status {
                StockStatus::InStock => summary.in_stock += 1,
                StockStatus::LowStock => summary.low_stock += 1,
                StockStatus::OutOfStock => summary.out_of_stock += 1,
            }
        }
        if !products.is_empty() {
            let total = products
                .iter()
                .fold(Decimal::ZERO, |total, product| total.saturating_add(product.quantity.into()));
            summary.average_stock = (total / Decimal::from(products.len() as i64)).round_dp(2);
        }
        summary
    }
}
