//! Registration, login, refresh and revoke endpoints.

use std::sync::Arc;

use auth::AuthResponse;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use saga::RegistrationInput;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::bearer_token;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "lastname")]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /api/v1/auth/register — runs the identity registration saga.
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(req) = payload?;
    let input = RegistrationInput {
        name: req.name,
        last_name: req.last_name,
        email: req.email,
        password: req.password,
    };

    let response = state
        .identity_saga
        .register(&input, &state.request_token())
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;
    let response = state.auth.login(&req.email, &req.password).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/refresh — exchanges a refresh token for a new pair.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;
    if req.refresh_token.trim().is_empty() {
        return Err(ApiError::bad_request("refresh_token is required"));
    }
    let response = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/revoke — blacklists the bearer token until it expires.
///
/// A missing or malformed header is a bad request here, not an auth failure.
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = bearer_token(&headers).map_err(ApiError::bad_request)?;
    state.auth.revoke(token);
    Ok(Json(MessageResponse {
        message: "token revoked successfully",
    }))
}
