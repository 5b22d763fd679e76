//! HTTP routes, one router per service.

pub mod analytics;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reports;
pub mod search;
pub mod users;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::service::Service;
use crate::state::AppState;

/// Routes served by one service, including `/` and `/health`.
pub fn service_router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/", get(health::info))
        .route("/health", get(health::check));

    let routes = match state.service {
        Service::User => routes
            .route("/register", post(users::register))
            .route("/users", get(users::list))
            .route("/users/{id}", get(users::get)),
        Service::Payment => routes
            .route("/process_payment", post(payments::process))
            .route("/process_payment_fail", post(payments::process_fail)),
        Service::Product => routes
            .route("/products", post(products::create).get(products::list))
            .route("/products/{id}", get(products::get).put(products::update)),
        Service::Search => routes.route("/search", get(search::query)),
        Service::Analytics => routes
            .route("/track_click", post(analytics::track_click))
            .route("/analytics/clicks", get(analytics::clicks)),
        Service::Report => routes
            .route("/generate_report", post(reports::generate))
            .route("/reports/{job_id}", get(reports::get)),
        Service::Order => routes
            .route("/create_order", post(orders::create))
            .route("/orders/{id}", get(orders::get)),
        Service::Inventory => routes.route("/inventory/{product_id}", get(inventory::get)),
        Service::Email | Service::Cache | Service::All => routes,
    };

    routes.with_state(state)
}
