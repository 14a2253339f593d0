//! API server entry point.

use std::sync::Arc;

use api::state::{Desk, Identities, Tickets};
use api::{AppState, Config};
use auth::{RevocationList, TokenIssuer};
use service_desk::{HttpServiceDesk, ResilientClient};
use sqlx::postgres::PgPoolOptions;
use store::{
    InMemoryIdentityRepository, InMemoryTicketRepository, PostgresIdentityRepository,
    PostgresTicketRepository,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Opens the repositories: PostgreSQL when a URL is configured, memory otherwise.
async fn open_store(config: &Config) -> (Identities, Tickets) {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            store::run_migrations(&pool)
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            (
                Arc::new(PostgresIdentityRepository::new(pool.clone())),
                Arc::new(PostgresTicketRepository::new(pool)),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            (
                Arc::new(InMemoryIdentityRepository::new()),
                Arc::new(InMemoryTicketRepository::new()),
            )
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load .env, then configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Collaborators
    let (identities, tickets) = open_store(&config).await;
    let client =
        ResilientClient::new(config.service_desk.clone()).expect("failed to build HTTP client");
    let desk: Desk = Arc::new(HttpServiceDesk::new(client));

    // 5. Token revocation with its sweeper
    let revocations = RevocationList::new();
    let sweeper = revocations.spawn_sweeper(config.sweep_interval);
    let issuer = TokenIssuer::new(config.jwt_secret.as_bytes(), revocations);

    // 6. Build the application
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        identities,
        tickets,
        desk,
        issuer,
        config.scopes,
        config.allowed_categories.clone(),
        shutdown.clone(),
    ));
    let app = api::create_app(state, metrics_handle);

    // 7. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    let on_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Abort in-flight retry waits so draining does not sit out backoff.
            on_signal.cancel();
        })
        .await
        .expect("server error");

    sweeper.shutdown().await;
    tracing::info!("server shut down gracefully");
}
