//! HTTP surface and runtime for the event-driven services.
//!
//! One binary runs any single service (`SERVICE=order`) or all of them in
//! one process (`SERVICE=all`). Each service gets its own broker client,
//! its consumers and a router; with `all`, every router is nested under
//! `/{service}` next to a combined `/health`.

pub mod config;
pub mod error;
pub mod records;
pub mod routes;
pub mod runtime;
pub mod service;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Builds the application router for the given per-service states.
pub fn create_app(states: &[Arc<AppState>], metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    let app = match states {
        [single] => routes::service_router(Arc::clone(single)),
        many => {
            let combined: Arc<[Arc<AppState>]> = many.iter().cloned().collect();
            let mut app = Router::new()
                .route("/health", get(routes::health::check_all))
                .with_state(combined);
            for state in many {
                let prefix = format!("/{}", state.service);
                app = app.nest(&prefix, routes::service_router(Arc::clone(state)));
            }
            app
        }
    };

    app.merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
