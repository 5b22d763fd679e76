//! Payments: asynchronous processing (scenario 2) and the failing saga step.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentAccepted {
    pub payment_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PaymentRejected {
    pub status: &'static str,
    pub reason: &'static str,
    pub message: &'static str,
}

/// POST /process_payment: queues the payment and returns immediately.
pub async fn process(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentAccepted>), ApiError> {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return Err(ApiError::BadRequest("amount must be a positive number".to_string()));
    }

    let payment_id = state
        .components
        .payments
        .initiate_payment(state.ctx.publisher(), req.amount, &req.currency)
        .await?;
    metrics::counter!("payments_initiated_total").increment(1);

    Ok((
        StatusCode::ACCEPTED,
        Json(PaymentAccepted {
            payment_id,
            status: "processing",
            message: "Payment initiated successfully. Processing asynchronously.",
        }),
    ))
}

/// POST /process_payment_fail: always declines.
///
/// Saga payment failures are driven by `StockReserved`, not by this route.
pub async fn process_fail() -> (StatusCode, Json<PaymentRejected>) {
    (
        StatusCode::ACCEPTED,
        Json(PaymentRejected {
            status: "failed",
            reason: "Insufficient funds",
            message: "Payment failed as expected for saga demonstration",
        }),
    )
}
