use std::str::FromStr;

use chrono::Utc;
use sqlx::Row;

use shopdesk_core::domain::product::{NewProduct, Product, ProductId, ProductUpdate, StockStatus};

use super::rows::{decode, format_timestamp, parse_decimal, parse_timestamp};
use super::{conflict_or_database, ProductRepository, RepositoryError};
use crate::DbPool;

const PRODUCT_COLUMNS: &str = "id, name, sku, description, price, quantity, status, category,
     reorder_point, next_restock, image_url, created_at, updated_at";

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(
        &self,
        clause: &str,
        binds: &[&str],
    ) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM product {clause} ORDER BY id ASC");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn save(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE product SET name = ?, description = ?, price = ?, quantity = ?, status = ?,
                 category = ?, reorder_point = ?, next_restock = ?, image_url = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.to_string())
        .bind(product.quantity)
        .bind(product.status.as_str())
        .bind(&product.category)
        .bind(product.reorder_point)
        .bind(product.next_restock.map(format_timestamp))
        .bind(&product.image_url)
        .bind(format_timestamp(product.updated_at))
        .bind(product.id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Escapes LIKE wildcards so user text matches literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    let id: i64 = decode(row.try_get("id"))?;
    let price: String = decode(row.try_get("price"))?;
    let status: String = decode(row.try_get("status"))?;
    let next_restock: Option<String> = decode(row.try_get("next_restock"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    Ok(Product {
        id: ProductId(id),
        name: decode(row.try_get("name"))?,
        sku: decode(row.try_get("sku"))?,
        description: decode(row.try_get("description"))?,
        price: parse_decimal("price", &price)?,
        quantity: decode(row.try_get("quantity"))?,
        status: StockStatus::from_str(&status)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        category: decode(row.try_get("category"))?,
        reorder_point: decode(row.try_get("reorder_point"))?,
        next_restock: next_restock
            .as_deref()
            .map(|value| parse_timestamp("next_restock", value))
            .transpose()?,
        image_url: decode(row.try_get("image_url"))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ?");
        let row = sqlx::query(&sql).bind(id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_product(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        Ok(self.fetch_where("WHERE sku = ?", &[sku]).await?.into_iter().next())
    }

    async fn search(&self, query: &str) -> Result<Vec<Product>, RepositoryError> {
        let pattern = like_pattern(query);
        self.fetch_where(
            "WHERE lower(name) LIKE ?1 ESCAPE '\\'
                OR lower(sku) LIKE ?1 ESCAPE '\\'
                OR lower(IFNULL(description, '')) LIKE ?1 ESCAPE '\\'",
            &[pattern.as_str()],
        )
        .await
    }

    async fn list_by_category(&self, category: &str) -> Result<Vec<Product>, RepositoryError> {
        self.fetch_where("WHERE lower(category) = lower(?)", &[category]).await
    }

    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        self.fetch_where("", &[]).await
    }

    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        product.validate()?;
        let sku = product.sku.clone();
        let mut created = product.into_product(ProductId(0), Utc::now());

        let result = sqlx::query(
            "INSERT INTO product (name, sku, description, price, quantity, status, category,
                                  reorder_point, next_restock, image_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&created.name)
        .bind(&created.sku)
        .bind(&created.description)
        .bind(created.price.to_string())
        .bind(created.quantity)
        .bind(created.status.as_str())
        .bind(&created.category)
        .bind(created.reorder_point)
        .bind(created.next_restock.map(format_timestamp))
        .bind(&created.image_url)
        .bind(format_timestamp(created.created_at))
        .bind(format_timestamp(created.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, format!("sku `{sku}` already exists")))?;

        created.id = ProductId(result.last_insert_rowid());
        Ok(created)
    }

    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        update.validate()?;
        let Some(mut product) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        update.apply_to(&mut product, Utc::now());
        self.save(&product).await?;
        Ok(Some(product))
    }

    async fn adjust_stock(
        &self,
        id: ProductId,
        delta: i64,
    ) -> Result<Option<Product>, RepositoryError> {
        // Every right-hand side sees the pre-update row.
        let sql = format!(
            "UPDATE product SET
                 quantity = MAX(quantity + ?1, 0),
                 status = CASE
                     WHEN quantity + ?1 <= 0 THEN 'out_of_stock'
                     WHEN quantity + ?1 <= reorder_point THEN 'low_stock'
                     ELSE 'in_stock'
                 END,
                 updated_at = ?2
             WHERE id = ?3
             RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(delta)
            .bind(format_timestamp(Utc::now()))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_product(r)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM product WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use shopdesk_core::domain::product::{NewProduct, ProductId, ProductUpdate, StockStatus};

    use super::SqlProductRepository;
    use crate::repositories::{ProductRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample(name: &str, sku: &str, quantity: i64, description: Option<&str>) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            sku: sku.to_string(),
            description: description.map(str::to_string),
            price: Decimal::new(14999, 2),
            quantity,
            category: Some("Electronics".to_string()),
            reorder_point: None,
            next_restock: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn create_and_find_round_trip_preserves_price_and_restock() {
        let repo = SqlProductRepository::new(setup().await);
        let mut input = sample("BassBoost Elite", "WH-BBE-300", 0, None);
        let restock = Utc::now() + Duration::days(5);
        input.next_restock = Some(restock);

        let created = repo.create(input).await.expect("create");
        let found = repo.find_by_id(created.id).await.expect("find").expect("exists");

        assert_eq!(found.price, Decimal::new(14999, 2));
        assert_eq!(found.status, StockStatus::OutOfStock);
        assert_eq!(
            found.next_restock.map(|dt| dt.timestamp()),
            Some(restock.timestamp()),
        );
        assert_eq!(repo.find_by_sku("WH-BBE-300").await.expect("by sku").map(|p| p.id), Some(created.id));
    }

    #[tokio::test]
    async fn duplicate_sku_maps_to_conflict() {
        let repo = SqlProductRepository::new(setup().await);
        repo.create(sample("A", "WH-SWP-100", 1, None)).await.expect("create");

        let error = repo.create(sample("B", "WH-SWP-100", 1, None)).await.expect_err("dup");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_literal() {
        let repo = SqlProductRepository::new(setup().await);
        repo.create(sample("SoundWave Pro X", "WH-SWP-100", 24, Some("Noise cancelling")))
            .await
            .expect("create");
        repo.create(sample("100% Cotton Case", "AC-CSE-001", 4, None)).await.expect("create");

        assert_eq!(repo.search("soundwave").await.expect("name").len(), 1);
        assert_eq!(repo.search("CANCEL").await.expect("description").len(), 1);
        assert_eq!(repo.search("100%").await.expect("literal percent").len(), 1);
        assert_eq!(repo.list_by_category("ELECTRONICS").await.expect("category").len(), 2);
    }

    #[tokio::test]
    async fn update_recomputes_status_and_delete_removes() {
        let repo = SqlProductRepository::new(setup().await);
        let created = repo.create(sample("AudioPeak Max", "WH-APM-200", 30, None)).await.expect("create");

        let updated = repo
            .update(created.id, ProductUpdate { quantity: Some(2), ..ProductUpdate::default() })
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(updated.status, StockStatus::LowStock);

        let reloaded = repo.find_by_id(created.id).await.expect("find").expect("exists");
        assert_eq!(reloaded.quantity, 2);

        assert!(repo.delete(created.id).await.expect("delete"));
        assert!(!repo.delete(created.id).await.expect("delete again"));
        assert!(repo.update(ProductId(404), ProductUpdate::default()).await.expect("update").is_none());
    }

    #[tokio::test]
    async fn adjust_stock_clamps_at_zero_and_recomputes_status() {
        let repo = SqlProductRepository::new(setup().await);
        let created = repo.create(sample("AudioPeak Max", "WH-APM-200", 12, None)).await.expect("create");

        let lowered = repo.adjust_stock(created.id, -8).await.expect("adjust").expect("exists");
        assert_eq!(lowered.quantity, 4);
        assert_eq!(lowered.status, StockStatus::LowStock);

        let emptied = repo.adjust_stock(created.id, -50).await.expect("adjust").expect("exists");
        assert_eq!(emptied.quantity, 0);
        assert_eq!(emptied.status, StockStatus::OutOfStock);

        let restocked = repo.adjust_stock(created.id, 20).await.expect("adjust").expect("exists");
        assert_eq!(restocked.quantity, 20);
        assert_eq!(restocked.status, StockStatus::InStock);

        assert!(repo.adjust_stock(ProductId(404), -1).await.expect("adjust").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adjustments_are_not_lost() {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("stock.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = std::sync::Arc::new(SqlProductRepository::new(pool));
        let created = repo.create(sample("SoundWave Pro X", "WH-SWP-100", 24, None)).await.expect("create");

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..6 {
            let repo = repo.clone();
            tasks.spawn(async move { repo.adjust_stock(created.id, -3).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.expect("task").expect("adjust");
        }

        let reloaded = repo.find_by_id(created.id).await.expect("find").expect("exists");
        assert_eq!(reloaded.quantity, 6);
    }
}
