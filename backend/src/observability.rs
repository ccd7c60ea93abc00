//! Tracing and metrics wiring
//!
//! `init_tracing` and `install_metrics_recorder` are called from `main` only.
//! Library code emits events through spans handed to it and bumps counters
//! through the helpers below, which are no-ops until a recorder is installed.

use anyhow::Result;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Mutex, PoisonError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static METRICS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

pub const AUTH_REJECTIONS: &str = "authgate_auth_rejections_total";
pub const SESSIONS_CREATED: &str = "authgate_sessions_created_total";
pub const REFRESH_ROTATIONS: &str = "authgate_refresh_rotations_total";
pub const LOGOUTS: &str = "authgate_logouts_total";
pub const SESSIONS_PURGED: &str = "authgate_sessions_purged_total";

/// Install the global subscriber
///
/// Filter precedence: `RUST_LOG`, then `LOG_LEVEL`, then a per-environment default.
pub fn init_tracing(production: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if production {
                "authgate_backend=info,tower_http=info".into()
            } else {
                "authgate_backend=debug,tower_http=debug,sqlx=warn".into()
            }
        });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if production {
        // JSON logging for production (better for log aggregation)
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Install the Prometheus recorder, once per process
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let mut slot = METRICS_HANDLE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    *slot = Some(handle.clone());
    Ok(handle)
}

/// `GET /metrics` in Prometheus text format
pub fn metrics_routes<S>(handle: PrometheusHandle) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

#[inline]
pub fn auth_rejected(reason: &'static str) {
    metrics::counter!(AUTH_REJECTIONS, "reason" => reason).increment(1);
}

#[inline]
pub fn session_created() {
    metrics::counter!(SESSIONS_CREATED).increment(1);
}

#[inline]
pub fn refresh_rotated() {
    metrics::counter!(REFRESH_ROTATIONS).increment(1);
}

#[inline]
pub fn logged_out() {
    metrics::counter!(LOGOUTS).increment(1);
}

#[inline]
pub fn sessions_purged(count: u64) {
    metrics::counter!(SESSIONS_PURGED).increment(count);
}
