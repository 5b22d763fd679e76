//! Health and service info endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::service::{Service, ServiceInfo};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub architecture: &'static str,
    pub rabbitmq_connected: bool,
}

impl HealthResponse {
    fn new(service: Service, connected: bool) -> Self {
        Self {
            status: "healthy",
            service: service.health_name(),
            architecture: "async",
            rabbitmq_connected: connected,
        }
    }
}

/// GET /health: liveness plus broker connectivity.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::new(state.service, state.broker_connected()))
}

/// GET /health for a process running every service.
pub async fn check_all(State(states): State<Arc<[Arc<AppState>]>>) -> Json<HealthResponse> {
    let connected = states.iter().all(|state| state.broker_connected());
    Json(HealthResponse::new(Service::All, connected))
}

/// GET /: what this service is.
pub async fn info(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(state.service.info())
}
