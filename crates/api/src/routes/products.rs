//! Product catalog (scenario 3: fanout of `ProductUpdated`).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use common::topology::PRODUCT_UPDATES_EXCHANGE;
use events::ProductUpdated;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::records::{Product, ProductChanges, ProductStore};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub stock: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub stock: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub stock: i64,
    pub event_published: bool,
}

impl ProductResponse {
    fn new(product: Product, event_published: bool) -> Self {
        Self {
            id: product.id,
            name: product.name,
            stock: product.stock,
            event_published,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductList {
    pub products: Vec<Product>,
    pub count: usize,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Product not found".to_string())
}

/// POST /products
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let product = state.components.products.create(&req.name, req.stock).await?;
    tracing::info!(product_id = %product.id, "product created");
    Ok((StatusCode::CREATED, Json(ProductResponse::new(product, false))))
}

/// PUT /products/{id}: applies the changes and broadcasts `ProductUpdated`
/// to every subscriber of the product updates exchange.
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let changes = ProductChanges {
        name: req.name,
        stock: req.stock,
    };
    let product = state
        .components
        .products
        .update(ProductId::new(id), changes)
        .await?
        .ok_or_else(not_found)?;

    state
        .ctx
        .publisher()
        .broadcast(
            PRODUCT_UPDATES_EXCHANGE,
            &ProductUpdated::new(product.id, product.name.clone(), product.stock),
        )
        .await?;

    tracing::info!(product_id = %product.id, "product updated, event broadcast");
    metrics::counter!("products_updated_total").increment(1);
    Ok(Json(ProductResponse::new(product, true)))
}

/// GET /products/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .components
        .products
        .get(ProductId::new(id))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(ProductResponse::new(product, false)))
}

/// GET /products
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<ProductList>, ApiError> {
    let products = state.components.products.list().await?;
    Ok(Json(ProductList {
        count: products.len(),
        products,
    }))
}
