use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use shopdesk_core::domain::product::{
    InventorySummary, NewProduct, Product, ProductId, ProductUpdate, StockStatus,
};
use tracing::info;

use crate::api::{api_error, repository_error, ApiError, ApiState};

pub async fn list_products(State(state): State<ApiState>) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state
        .products
        .list_all()
        .await
        .map_err(|error| repository_error(error, "Error fetching inventory"))?;
    Ok(Json(products))
}

pub async fn summary(State(state): State<ApiState>) -> Result<Json<InventorySummary>, ApiError> {
    let products = state
        .products
        .list_all()
        .await
        .map_err(|error| repository_error(error, "Error fetching inventory summary"))?;
    Ok(Json(InventorySummary::from_products(&products)))
}

/// Products at or below their reorder point, including out-of-stock ones.
pub async fn low_stock(State(state): State<ApiState>) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state
        .products
        .list_all()
        .await
        .map_err(|error| repository_error(error, "Error fetching low stock products"))?;
    Ok(Json(products.into_iter().filter(|product| product.status != StockStatus::InStock).collect()))
}

pub async fn create_product(
    State(state): State<ApiState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(product) = payload.map_err(|rejection| {
        api_error(StatusCode::BAD_REQUEST, format!("Invalid product data: {}", rejection.body_text()))
    })?;

    let created = state
        .products
        .create(product)
        .await
        .map_err(|error| repository_error(error, "Invalid product data"))?;

    info!(
        event_name = "api.inventory.created",
        product_id = created.id.0,
        sku = %created.sku,
        "product created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_product(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ProductUpdate>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(id) = id.map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid product id"))?;
    let Json(update) = payload.map_err(|rejection| {
        api_error(StatusCode::BAD_REQUEST, format!("Invalid product data: {}", rejection.body_text()))
    })?;

    state
        .products
        .update(ProductId(id), update)
        .await
        .map_err(|error| repository_error(error, "Invalid product data"))?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Product not found"))
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        Json,
    };
    use rust_decimal::Decimal;
    use shopdesk_core::domain::product::{NewProduct, ProductUpdate, StockStatus};

    use super::{create_product, list_products, low_stock, summary, update_product};
    use crate::api::test_support::seeded_state;

    fn cable() -> NewProduct {
        NewProduct {
            name: "USB-C Cable".to_string(),
            sku: "AC-USB-010".to_string(),
            description: None,
            price: Decimal::new(1299, 2),
            quantity: 40,
            category: Some("Accessories".to_string()),
            reorder_point: None,
            next_restock: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn summary_and_low_stock_follow_sample_catalog() {
        let state = seeded_state().await;

        let Json(report) = summary(State(state.clone())).await.expect("summary");
        assert_eq!(report.total_products, 4);
        assert_eq!(report.in_stock, 2);
        assert_eq!(report.low_stock, 1);
        assert_eq!(report.out_of_stock, 1);

        let Json(flagged) = low_stock(State(state)).await.expect("low stock");
        let mut skus: Vec<_> = flagged.iter().map(|product| product.sku.as_str()).collect();
        skus.sort_unstable();
        assert_eq!(skus, vec!["WH-APM-200", "WH-BBE-300"]);
    }

    #[tokio::test]
    async fn create_returns_201_and_rejects_duplicates() {
        let state = seeded_state().await;

        let (status, Json(created)) =
            create_product(State(state.clone()), Ok(Json(cable()))).await.expect("create");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.status, StockStatus::InStock);
        assert_eq!(created.reorder_point, 5);

        let Json(all) = list_products(State(state.clone())).await.expect("list");
        assert_eq!(all.len(), 5);

        let (status, _) =
            create_product(State(state), Ok(Json(cable()))).await.expect_err("duplicate sku");
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_rejects_invalid_product() {
        let state = seeded_state().await;
        let mut product = cable();
        product.name = "  ".to_string();

        let (status, Json(body)) =
            create_product(State(state), Ok(Json(product))).await.expect_err("blank name");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.starts_with("Invalid product data"));
    }

    #[tokio::test]
    async fn update_recomputes_status_and_reports_unknown_ids() {
        let state = seeded_state().await;
        let target = state
            .products
            .find_by_sku("WH-SWP-100")
            .await
            .expect("lookup")
            .expect("sample product");

        let Json(updated) = update_product(
            State(state.clone()),
            Ok(Path(target.id.0)),
            Ok(Json(ProductUpdate { quantity: Some(2), ..ProductUpdate::default() })),
        )
        .await
        .expect("update");
        assert_eq!(updated.quantity, 2);
        assert_eq!(updated.status, StockStatus::LowStock);

        let (status, Json(body)) = update_product(
            State(state),
            Ok(Path(999)),
            Ok(Json(ProductUpdate::default())),
        )
        .await
        .expect_err("unknown product");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Product not found");
    }

    #[tokio::test]
    async fn update_rejects_negative_quantity() {
        let state = seeded_state().await;
        let target = state
            .products
            .find_by_sku("WH-SWP-100")
            .await
            .expect("lookup")
            .expect("sample product");

        let (status, Json(body)) = update_product(
            State(state.clone()),
            Ok(Path(target.id.0)),
            Ok(Json(ProductUpdate { quantity: Some(-5), ..ProductUpdate::default() })),
        )
        .await
        .expect_err("negative quantity");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.starts_with("Invalid product data"));

        let unchanged = state.products.find_by_id(target.id).await.expect("lookup").expect("present");
        assert_eq!(unchanged.quantity, target.quantity);
    }
}
