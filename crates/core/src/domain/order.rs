use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::product::ProductId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

/// Order lifecycle status. Stored values outside the known set are preserved
/// verbatim in `Other` rather than rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Shipped,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "shipped" => Self::Shipped,
            "cancelled" => Self::Cancelled,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total: Decimal,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub order_number: String,
    #[serde(default)]
    pub status: OrderStatus,
    /// Defaults to the sum of item lines when absent.
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.order_number.trim().is_empty() {
            return Err(DomainError::InvariantViolation("order number is required".to_string()));
        }
        if self.items.iter().any(|item| item.quantity <= 0) {
            return Err(DomainError::InvariantViolation(
                "order item quantities must be positive".to_string(),
            ));
        }
        if self.items.iter().any(|item| item.price.is_sign_negative())
            || self.total.is_some_and(|total| total.is_sign_negative())
        {
            return Err(DomainError::InvariantViolation(
                "order amounts must not be negative".to_string(),
            ));
        }
        if self.line_total().is_none() {
            return Err(DomainError::InvariantViolation(
                "order line total is out of range".to_string(),
            ));
        }
        Ok(())
    }

    /// Sum of `price * quantity` over all items; `None` on decimal overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        self.items.iter().try_fold(Decimal::ZERO, |total, item| {
            item.price.checked_mul(Decimal::from(item.quantity))?.checked_add(total)
        })
    }

    /// Callers validate first; an overflowing line sum saturates.
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Order {
        let total = self.total.unwrap_or_else(|| self.line_total().unwrap_or(Decimal::MAX));
        Order {
            id,
            order_number: self.order_number,
            status: self.status,
            total,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            items: self.items,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub total_orders: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub total_value: Decimal,
    pub average_value: Decimal,
}

impl OrderSummary {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut summary = Self::default();
        for order in orders {
            summary.total_orders += 1;
            *summary.status_counts.entry(order.status.as_str().to_string()).or_default() += 1;
            summary.total_value = summary.total_value.saturating_add(order.total);
        }
        if summary.total_orders > 0 {
            summary.average_value =
                (summary.total_value / Decimal::from(summary.total_orders as i64)).round_dp(2);
        }
        summary
    }

    /// Summary restricted to orders created on `day` (UTC).
    pub fn for_day(orders: &[Order], day: NaiveDate) -> Self {
        Self::from_orders(orders.iter().filter(|order| order.created_at.date_naive() == day))
    }
}
