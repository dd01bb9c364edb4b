//! Sample catalog and order history used by `shopdesk seed` and tests.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use shopdesk_core::domain::order::{NewOrder, OrderItem, OrderStatus};
use shopdesk_core::domain::product::NewProduct;

use crate::repositories::{OrderRepository, ProductRepository, RepositoryError};

struct SampleProduct {
    name: &'static str,
    sku: &'static str,
    description: &'static str,
    price_cents: i64,
    quantity: i64,
    category: &'static str,
    reorder_point: i64,
    restock_in_days: Option<i64>,
}

struct SampleOrder {
    order_number: &'static str,
    status: OrderStatus,
    total_cents: i64,
    customer_name: &'static str,
    customer_email: &'static str,
    /// `(sku, quantity, unit price in cents)`
    lines: &'static [(&'static str, i64, i64)],
}

const SAMPLE_PRODUCTS: &[SampleProduct] = &[
    SampleProduct {
        name: "SoundWave Pro X",
        sku: "WH-SWP-100",
        description: "Premium wireless headphones with noise cancellation",
        price_cents: 12999,
        quantity: 24,
        category: "Electronics",
        reorder_point: 10,
        restock_in_days: None,
    },
    SampleProduct {
        name: "AudioPeak Max",
        sku: "WH-APM-200",
        description: "Wireless headphones with enhanced bass",
        price_cents: 8999,
        quantity: 3,
        category: "Electronics",
        reorder_point: 5,
        restock_in_days: None,
    },
    SampleProduct {
        name: "BassBoost Elite",
        sku: "WH-BBE-300",
        description: "Premium bass-focused wireless headphones",
        price_cents: 14999,
        quantity: 0,
        category: "Electronics",
        reorder_point: 5,
        restock_in_days: Some(5),
    },
    SampleProduct {
        name: "Galaxy Tab A14",
        sku: "SAM-GA14-KE",
        description: "14-inch tablet with keyboard edition cover",
        price_cents: 44999,
        quantity: 12,
        category: "Computers",
        reorder_point: 4,
        restock_in_days: None,
    },
];

const SAMPLE_ORDERS: &[SampleOrder] = &[
    SampleOrder {
        order_number: "38291",
        status: OrderStatus::Completed,
        total_cents: 12495,
        customer_name: "John Doe",
        customer_email: "john.doe@example.com",
        lines: &[("WH-SWP-100", 1, 12495)],
    },
    SampleOrder {
        order_number: "38290",
        status: OrderStatus::Processing,
        total_cents: 8999,
        customer_name: "Jane Smith",
        customer_email: "jane.smith@example.com",
        lines: &[("WH-APM-200", 1, 8999)],
    },
    SampleOrder {
        order_number: "38289",
        status: OrderStatus::Shipped,
        total_cents: 24550,
        customer_name: "Bob Johnson",
        customer_email: "bob.johnson@example.com",
        lines: &[("WH-BBE-300", 1, 14999), ("WH-APM-200", 1, 8999)],
    },
];

/// Seeds the demo catalog. Loading is idempotent: records whose SKU or order
/// number already exist are skipped.
pub struct SampleDataset;

impl SampleDataset {
    pub fn products(now: DateTime<Utc>) -> Vec<NewProduct> {
        SAMPLE_PRODUCTS
            .iter()
            .map(|sample| NewProduct {
                name: sample.name.to_string(),
                sku: sample.sku.to_string(),
                description: Some(sample.description.to_string()),
                price: Decimal::new(sample.price_cents, 2),
                quantity: sample.quantity,
                category: Some(sample.category.to_string()),
                reorder_point: Some(sample.reorder_point),
                next_restock: sample.restock_in_days.map(|days| now + Duration::days(days)),
                image_url: None,
            })
            .collect()
    }

    pub async fn load(
        products: &dyn ProductRepository,
        orders: &dyn OrderRepository,
    ) -> Result<SeedResult, RepositoryError> {
        let mut result = SeedResult::default();

        for product in Self::products(Utc::now()) {
            if products.find_by_sku(&product.sku).await?.is_some() {
                result.products_skipped += 1;
                continue;
            }
            products.create(product).await?;
            result.products_created += 1;
        }

        for sample in SAMPLE_ORDERS {
            if orders.find_by_number(sample.order_number).await?.is_some() {
                result.orders_skipped += 1;
                continue;
            }

            let mut items = Vec::with_capacity(sample.lines.len());
            for (sku, quantity, price_cents) in sample.lines {
                let product = products.find_by_sku(sku).await?.ok_or_else(|| {
                    RepositoryError::Validation(format!("sample order references unknown sku `{sku}`"))
                })?;
                items.push(OrderItem {
                    product_id: product.id,
                    quantity: *quantity,
                    price: Decimal::new(*price_cents, 2),
                });
            }

            orders
                .create(NewOrder {
                    order_number: sample.order_number.to_string(),
                    status: sample.status.clone(),
                    total: Some(Decimal::new(sample.total_cents, 2)),
                    customer_name: Some(sample.customer_name.to_string()),
                    customer_email: Some(sample.customer_email.to_string()),
                    items,
                })
                .await?;
            result.orders_created += 1;
        }

        Ok(result)
    }

    pub async fn verify(
        products: &dyn ProductRepository,
        orders: &dyn OrderRepository,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SAMPLE_PRODUCTS.len() + SAMPLE_ORDERS.len());
        for sample in SAMPLE_PRODUCTS {
            checks.push((sample.sku, products.find_by_sku(sample.sku).await?.is_some()));
        }
        for sample in SAMPLE_ORDERS {
            checks.push((
                sample.order_number,
                orders.find_by_number(sample.order_number).await?.is_some(),
            ));
        }
        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub products_created: usize,
    pub products_skipped: usize,
    pub orders_created: usize,
    pub orders_skipped: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
