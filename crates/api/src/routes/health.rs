//! Health check endpoint.

use axum::Json;
use serde::Serialize;

/// Name reported by the health check.
pub const SERVICE_NAME: &str = "helpdesk-gateway";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// GET /health — liveness only; neither the store nor the service desk is probed.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
    })
}
