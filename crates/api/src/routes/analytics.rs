//! Click ingestion (scenario 6: the broker as a write buffer).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::UserId;
use common::topology::CLICK_TRACKED_QUEUE;
use events::ClickTracked;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub user_id: UserId,
    pub page: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Tracked {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ClickSummary {
    pub clicks: BTreeMap<String, u64>,
    pub total: u64,
}

/// POST /track_click: publishes and returns without waiting for processing.
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClickRequest>,
) -> Result<Json<Tracked>, ApiError> {
    state
        .ctx
        .publisher()
        .send(
            CLICK_TRACKED_QUEUE,
            &ClickTracked::new(req.user_id, req.page, req.session_id),
        )
        .await?;
    metrics::counter!("clicks_ingested_total").increment(1);
    Ok(Json(Tracked { status: "tracked" }))
}

/// GET /analytics/clicks: per-page counts of processed clicks.
pub async fn clicks(State(state): State<Arc<AppState>>) -> Json<ClickSummary> {
    let analytics = &state.components.analytics;
    Json(ClickSummary {
        clicks: analytics.clicks(),
        total: analytics.total_clicks(),
    })
}
