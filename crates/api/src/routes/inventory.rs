//! Inventory reservations as seen by the saga.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use saga::InventoryItem;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /inventory/{product_id}: reserved quantity, zero when never reserved.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> Result<Json<InventoryItem>, ApiError> {
    let item = state
        .components
        .inventory
        .get_inventory(ProductId::new(product_id))
        .await?;
    Ok(Json(item))
}
