//! Reference data and service desk lookups.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ticketing::{Reference, TicketMeta};

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::state::AppState;

#[derive(Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Deserialize)]
pub struct ArticlesQuery {
    pub category_id: Option<String>,
}

/// GET /api/v1/categories — service desk categories on the allow-list.
pub async fn categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<Vec<Value>>>, ApiError> {
    let data = state.tickets.categories(&state.request_token()).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/ticket-meta
pub async fn ticket_meta(State(state): State<Arc<AppState>>) -> Json<TicketMeta> {
    Json(state.tickets.ticket_meta())
}

/// GET /api/v1/statuses
pub async fn statuses(
    State(state): State<Arc<AppState>>,
) -> Json<DataResponse<&'static [Reference]>> {
    Json(DataResponse {
        data: state.tickets.statuses(),
    })
}

/// GET /api/v1/articles?category_id=N
pub async fn articles(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ArticlesQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let raw = query
        .category_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("category_id query parameter is required"))?;
    let category_id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("category_id must be a valid integer"))?;

    let articles = state
        .tickets
        .articles(category_id, &state.request_token())
        .await?;
    Ok(Json(articles))
}

/// GET /api/v1/users/{id} — a user as the service desk holds it.
pub async fn external_user(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user_id: i64 = id
        .parse()
        .map_err(|_| ApiError::bad_request("user id must be numeric"))?;
    let user = state
        .tickets
        .external_user(user_id, &state.request_token())
        .await?;
    Ok(Json(user))
}
