//! Product search over the index maintained by the search worker.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use workers::SearchDocument;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub results: Vec<SearchDocument>,
    pub count: usize,
}

/// GET /search?q=: an empty query matches every indexed product.
pub async fn query(State(state): State<Arc<AppState>>, Query(params): Query<SearchParams>) -> Json<SearchResults> {
    let results = state.components.search.search(&params.q);
    Json(SearchResults {
        count: results.len(),
        results,
    })
}
