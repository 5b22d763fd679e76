//! Order endpoints (scenario 5: the order saga's entry point).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, ProductId};
use saga::Order;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

/// POST /create_order: stores a pending order and starts the saga.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .components
        .orders
        .create_order(state.ctx.publisher(), req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(order)))
}

/// GET /orders/{id}
pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<Json<Order>, ApiError> {
    state
        .components
        .orders
        .get_order(OrderId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))
}
