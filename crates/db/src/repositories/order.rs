use chrono::Utc;
use sqlx::Row;

use shopdesk_core::domain::order::{NewOrder, Order, OrderId, OrderItem, OrderStatus};
use shopdesk_core::domain::product::ProductId;

use super::rows::{decode, format_timestamp, parse_decimal, parse_timestamp};
use super::{conflict_or_database, OrderRepository, RepositoryError};
use crate::DbPool;

const ORDER_COLUMNS: &str = "id, order_number, status, total, customer_name, customer_email,
     created_at, updated_at";

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: i64) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id, quantity, price FROM order_item
             WHERE order_id = ? ORDER BY line_number ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let price: String = decode(row.try_get("price"))?;
                Ok(OrderItem {
                    product_id: ProductId(decode(row.try_get("product_id"))?),
                    quantity: decode(row.try_get("quantity"))?,
                    price: parse_decimal("price", &price)?,
                })
            })
            .collect()
    }

    async fn hydrate(
        &self,
        rows: Vec<sqlx::sqlite::SqliteRow>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = row_to_order(row)?;
            order.items = self.load_items(order.id.0).await?;
            orders.push(order);
        }
        Ok(orders)
    }
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let status: String = decode(row.try_get("status"))?;
    let total: String = decode(row.try_get("total"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    Ok(Order {
        id: OrderId(decode(row.try_get("id"))?),
        order_number: decode(row.try_get("order_number"))?,
        status: OrderStatus::parse(&status),
        total: parse_decimal("total", &total)?,
        customer_name: decode(row.try_get("customer_name"))?,
        customer_email: decode(row.try_get("customer_email"))?,
        items: Vec::new(),
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM customer_order WHERE id = ?");
        let rows = sqlx::query(&sql).bind(id.0).fetch_all(&self.pool).await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM customer_order WHERE order_number = ?");
        let rows = sqlx::query(&sql).bind(order_number).fetch_all(&self.pool).await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM customer_order ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        order.validate()?;
        let order_number = order.order_number.clone();
        let mut created = order.into_order(OrderId(0), Utc::now());

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO customer_order (order_number, status, total, customer_name,
                                         customer_email, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&created.order_number)
        .bind(created.status.as_str())
        .bind(created.total.to_string())
        .bind(&created.customer_name)
        .bind(&created.customer_email)
        .bind(format_timestamp(created.created_at))
        .bind(format_timestamp(created.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_or_database(e, format!("order number `{order_number}` already exists"))
        })?;
        let order_id = result.last_insert_rowid();

        for (line_number, item) in created.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_item (order_id, line_number, product_id, quantity, price)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(line_number as i64)
            .bind(item.product_id.0)
            .bind(item.quantity)
            .bind(item.price.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        created.id = OrderId(order_id);
        Ok(created)
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let result = sqlx::query("UPDATE customer_order SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_timestamp(Utc::now()))
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }
}
