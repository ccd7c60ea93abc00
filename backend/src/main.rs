//! Authgate Backend
//!
//! ## Architecture
//!
//! The backend follows a layered architecture:
//! - Routes: HTTP request handling and routing
//! - Auth: token issuer, session ledger, request pipeline
//! - Services: login/refresh/logout and account operations
//! - Repositories: PostgreSQL (SQLx) or in-memory storage

use anyhow::Result;
use authgate_backend::{
    auth::SessionLedger,
    clock::SystemClock,
    config::AppConfig,
    observability, routes,
    state::AppState,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, info_span, warn, Span};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let production = AppConfig::is_production();
    observability::init_tracing(production);

    let config = AppConfig::load()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = if production { "production" } else { "development" },
        "Starting Authgate"
    );

    if let Err(e) = config.validate(production) {
        error!("Configuration error: {}", e);
        anyhow::bail!("Invalid configuration");
    }
    if production {
        warn_on_production_smells(&config);
    }

    let metrics = observability::install_metrics_recorder()?;

    let state = AppState::connect(config, Arc::new(SystemClock), info_span!("authgate")).await?;
    let config = state.config().clone();

    if let Some(admin) = &config.admin {
        state
            .users()
            .ensure_admin(&admin.email, admin.password.expose_secret())
            .await?;
    }

    let purge = tokio::spawn(purge_expired_sessions(
        state.ledger().clone(),
        Duration::from_secs(config.session.purge_interval_secs.max(1)),
        info_span!("session_purge"),
    ));

    let app = routes::create_router(state).merge(observability::metrics_routes(metrics));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Periodically drop sessions whose refresh window has closed
async fn purge_expired_sessions(ledger: SessionLedger, every: Duration, log: Span) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match ledger.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => {
                observability::sessions_purged(purged);
                info!(parent: &log, purged, "expired sessions purged");
            }
            Err(e) => warn!(parent: &log, error = %e, "session purge failed"),
        }
    }
}

fn warn_on_production_smells(config: &AppConfig) {
    if config.database.url.contains("localhost") || config.database.url.contains("127.0.0.1") {
        warn!("Database URL contains localhost - ensure this is intentional for production");
    }
    if config.database.backend == authgate_backend::config::StorageBackend::Memory {
        warn!("In-memory storage in production: sessions are lost on restart");
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
