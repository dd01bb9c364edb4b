use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use shopdesk_core::domain::order::{NewOrder, Order, OrderId, OrderStatus, OrderSummary};
use shopdesk_db::{ProductRepository, RepositoryError};
use tracing::{info, warn};

use crate::api::{api_error, repository_error, ApiError, ApiState};

pub const DEFAULT_RECENT_LIMIT: usize = 5;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecentOrdersQuery {
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

pub async fn list_orders(State(state): State<ApiState>) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state
        .orders
        .list_all()
        .await
        .map_err(|error| repository_error(error, "Error fetching orders"))?;
    Ok(Json(orders))
}

pub async fn recent_orders(
    State(state): State<ApiState>,
    query: Result<Query<RecentOrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let Query(query) =
        query.map_err(|_| api_error(StatusCode::BAD_REQUEST, "limit must be a non-negative number"))?;

    let orders = state
        .orders
        .list_recent(query.limit.unwrap_or(DEFAULT_RECENT_LIMIT))
        .await
        .map_err(|error| repository_error(error, "Error fetching recent orders"))?;
    Ok(Json(orders))
}

pub async fn summary(State(state): State<ApiState>) -> Result<Json<OrderSummary>, ApiError> {
    let orders = state
        .orders
        .list_all()
        .await
        .map_err(|error| repository_error(error, "Error fetching orders summary"))?;
    Ok(Json(OrderSummary::from_orders(&orders)))
}

/// Orders created on the current UTC calendar day.
pub async fn today(State(state): State<ApiState>) -> Result<Json<OrderSummary>, ApiError> {
    let orders = state
        .orders
        .list_all()
        .await
        .map_err(|error| repository_error(error, "Error fetching today's orders"))?;
    Ok(Json(OrderSummary::for_day(&orders, Utc::now().date_naive())))
}

pub async fn place_order(
    State(state): State<ApiState>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(order) = payload.map_err(|rejection| {
        api_error(StatusCode::BAD_REQUEST, format!("Invalid order data: {}", rejection.body_text()))
    })?;

    let created = state
        .orders
        .create(order)
        .await
        .map_err(|error| repository_error(error, "Invalid order data"))?;

    // The order is already stored; a stock failure is reported but not rolled back.
    decrement_stock(state.products.as_ref(), &created)
        .await
        .map_err(|error| repository_error(error, "Error updating inventory"))?;

    info!(
        event_name = "api.orders.placed",
        order_id = created.id.0,
        order_number = %created.order_number,
        items = created.items.len(),
        "order placed"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

/// Takes each ordered quantity out of stock. Quantities stop at zero and the
/// stock status is recomputed against the product's reorder point.
pub async fn decrement_stock(
    products: &dyn ProductRepository,
    order: &Order,
) -> Result<(), RepositoryError> {
    for item in &order.items {
        if products.adjust_stock(item.product_id, item.quantity.saturating_neg()).await?.is_none() {
            warn!(
                event_name = "api.orders.unknown_product",
                order_number = %order.order_number,
                product_id = item.product_id.0,
                "ordered product not in catalog; stock left unchanged"
            );
        }
    }
    Ok(())
}

pub async fn update_status(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(id) = id.map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid order id"))?;
    let Json(request) = payload.map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid status"))?;
    if request.status.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid status"));
    }

    state
        .orders
        .update_status(OrderId(id), OrderStatus::parse(&request.status))
        .await
        .map_err(|error| repository_error(error, "Invalid status"))?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Order not found"))
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        Json,
    };
    use rust_decimal::Decimal;
    use shopdesk_core::domain::order::{NewOrder, OrderItem, OrderStatus};
    use shopdesk_core::domain::product::{ProductId, StockStatus};

    use super::{
        list_orders, place_order, recent_orders, summary, today, update_status, RecentOrdersQuery,
        StatusUpdateRequest,
    };
    use crate::api::test_support::seeded_state;

    fn order_for(product_id: ProductId, quantity: i64) -> NewOrder {
        NewOrder {
            order_number: "38292".to_string(),
            status: OrderStatus::Pending,
            total: None,
            customer_name: Some("Dana Lee".to_string()),
            customer_email: None,
            items: vec![OrderItem { product_id, quantity, price: Decimal::new(12999, 2) }],
        }
    }

    #[tokio::test]
    async fn placing_an_order_decrements_stock_and_recomputes_status() {
        let state = seeded_state().await;
        let headphones = state
            .products
            .find_by_sku("WH-SWP-100")
            .await
            .expect("lookup")
            .expect("sample product");

        let (status, Json(order)) = place_order(State(state.clone()), Ok(Json(order_for(headphones.id, 15))))
            .await
            .expect("place order");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order.total, Decimal::new(194985, 2));

        let after = state
            .products
            .find_by_id(headphones.id)
            .await
            .expect("lookup")
            .expect("still present");
        assert_eq!(after.quantity, 9);
        assert_eq!(after.status, StockStatus::LowStock);
    }

    #[tokio::test]
    async fn overselling_stops_at_zero() {
        let state = seeded_state().await;
        let tablet = state
            .products
            .find_by_sku("SAM-GA14-KE")
            .await
            .expect("lookup")
            .expect("sample product");

        place_order(State(state.clone()), Ok(Json(order_for(tablet.id, 50))))
            .await
            .expect("place order");

        let after = state.products.find_by_id(tablet.id).await.expect("lookup").expect("present");
        assert_eq!(after.quantity, 0);
        assert_eq!(after.status, StockStatus::OutOfStock);
    }

    #[tokio::test]
    async fn unknown_products_do_not_block_the_order() {
        let state = seeded_state().await;

        let (status, _) = place_order(State(state.clone()), Ok(Json(order_for(ProductId(999), 1))))
            .await
            .expect("place order");

        assert_eq!(status, StatusCode::CREATED);
        let Json(orders) = list_orders(State(state)).await.expect("list");
        assert_eq!(orders.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_each_take_their_stock() {
        let state = seeded_state().await;
        let headphones = state
            .products
            .find_by_sku("WH-SWP-100")
            .await
            .expect("lookup")
            .expect("sample product");

        let mut tasks = tokio::task::JoinSet::new();
        for number in 0..6 {
            let state = state.clone();
            let mut order = order_for(headphones.id, 3);
            order.order_number = format!("39{number:03}");
            tasks.spawn(async move { place_order(State(state), Ok(Json(order))).await });
        }
        while let Some(result) = tasks.join_next().await {
            let (status, _) = result.expect("task").expect("place order");
            assert_eq!(status, StatusCode::CREATED);
        }

        let after = state
            .products
            .find_by_id(headphones.id)
            .await
            .expect("lookup")
            .expect("still present");
        assert_eq!(after.quantity, headphones.quantity - 18);
    }

    #[tokio::test]
    async fn overflowing_order_value_is_rejected() {
        let state = seeded_state().await;
        let mut order = order_for(ProductId(1), 2);
        order.items[0].price = Decimal::MAX;

        let (status, Json(body)) =
            place_order(State(state.clone()), Ok(Json(order))).await.expect_err("overflow");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.starts_with("Invalid order data"));
        let Json(orders) = list_orders(State(state)).await.expect("list");
        assert_eq!(orders.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_order_number_is_a_conflict() {
        let state = seeded_state().await;
        let mut order = order_for(ProductId(1), 1);
        order.order_number = "38291".to_string();

        let (status, _) = place_order(State(state), Ok(Json(order))).await.expect_err("duplicate");

        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn recent_defaults_to_five_and_honours_limit() {
        let state = seeded_state().await;

        let Json(all) =
            recent_orders(State(state.clone()), Ok(Query(RecentOrdersQuery::default())))
                .await
                .expect("recent");
        assert_eq!(all.len(), 3);

        let Json(two) =
            recent_orders(State(state), Ok(Query(RecentOrdersQuery { limit: Some(2) })))
                .await
                .expect("recent");
        assert_eq!(two.len(), 2);
        assert!(two[0].created_at >= two[1].created_at);
    }

    #[tokio::test]
    async fn summaries_cover_all_orders_and_today() {
        let state = seeded_state().await;

        let Json(overall) = summary(State(state.clone())).await.expect("summary");
        assert_eq!(overall.total_orders, 3);
        assert_eq!(overall.status_counts.get("completed"), Some(&1));
        assert_eq!(overall.status_counts.get("processing"), Some(&1));
        assert_eq!(overall.status_counts.get("shipped"), Some(&1));

        // Sample orders are created at seed time, so they all fall on today.
        let Json(current) = today(State(state)).await.expect("today");
        assert_eq!(current.total_orders, 3);
        assert_eq!(current.total_value, overall.total_value);
    }

    #[tokio::test]
    async fn status_update_parses_and_reports_unknown_ids() {
        let state = seeded_state().await;
        let order = state
            .orders
            .find_by_number("38290")
            .await
            .expect("lookup")
            .expect("sample order");

        let Json(updated) = update_status(
            State(state.clone()),
            Ok(Path(order.id.0)),
            Ok(Json(StatusUpdateRequest { status: "Shipped".to_string() })),
        )
        .await
        .expect("update");
        assert_eq!(updated.status, OrderStatus::Shipped);

        let (status, Json(body)) = update_status(
            State(state.clone()),
            Ok(Path(999)),
            Ok(Json(StatusUpdateRequest { status: "shipped".to_string() })),
        )
        .await
        .expect_err("unknown order");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Order not found");

        let (status, _) = update_status(
            State(state),
            Ok(Path(order.id.0)),
            Ok(Json(StatusUpdateRequest { status: " ".to_string() })),
        )
        .await
        .expect_err("blank status");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
