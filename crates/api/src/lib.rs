//! HTTP gateway for identity registration and service desk ticketing.
//!
//! Provides versioned REST endpoints under `/api/v1` for registration,
//! token lifecycle and tickets, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware::map_response;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use state::AppState;

/// Largest request body accepted, attachments included.
pub const MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let api_v1 = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/auth/revoke", post(routes::auth::revoke))
        .route(
            "/tickets",
            post(routes::tickets::create).get(routes::tickets::list),
        )
        .route(
            "/tickets/{id}",
            get(routes::tickets::detail).put(routes::tickets::update),
        )
        .route(
            "/tickets/{id}/comments",
            get(routes::tickets::comments).post(routes::tickets::add_comment),
        )
        .route(
            "/tickets/attachments/{attachment_id}",
            get(routes::tickets::attachment),
        )
        .route(
            "/tickets/{id}/solution",
            put(routes::tickets::accept_solution),
        )
        .route(
            "/tickets/{id}/solution/reject",
            put(routes::tickets::reject_solution),
        )
        .route("/users/{id}", get(routes::reference::external_user))
        .route("/categories", get(routes::reference::categories))
        .route("/ticket-meta", get(routes::reference::ticket_meta))
        .route("/statuses", get(routes::reference::statuses))
        .route("/articles", get(routes::reference::articles));

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/v1", api_v1)
        .with_state(state)
        .merge(metrics_router)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(map_response(middleware::security_headers))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
}
