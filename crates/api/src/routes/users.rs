//! User registration (scenario 1: decoupling the welcome email).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::UserId;
use common::topology::USER_REGISTERED_QUEUE;
use events::{UserRegistered, is_valid_email};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::records::{User, UserStore};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: UserId,
    pub email: String,
    pub message: &'static str,
    pub event_published: bool,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub count: usize,
}

/// POST /register: stores the user and queues the welcome email.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    if !is_valid_email(&req.email) {
        return Err(ApiError::BadRequest(format!("Invalid email address: {}", req.email)));
    }

    let user = state.components.users.create(&req.email).await?;
    state
        .ctx
        .publisher()
        .send(USER_REGISTERED_QUEUE, &UserRegistered::new(user.id, user.email.clone()))
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    metrics::counter!("users_registered_total").increment(1);

    Ok((
        StatusCode::ACCEPTED,
        Json(RegisterResponse {
            id: user.id,
            email: user.email,
            message: "User registered successfully. Welcome email will be sent shortly.",
            event_published: true,
        }),
    ))
}

/// GET /users/{id}
pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<Json<User>, ApiError> {
    state
        .components
        .users
        .get(UserId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// GET /users
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<UserList>, ApiError> {
    let users = state.components.users.list().await?;
    Ok(Json(UserList {
        count: users.len(),
        users,
    }))
}
