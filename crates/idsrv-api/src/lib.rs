//! # idsrv-api: HTTP Service for Signed Identity Lookups
//!
//! ## API Surface
//!
//! | Prefix | Module | Purpose |
//! |--------|--------|---------|
//! | `/_matrix/identity/api/v1` | [`routes::lookup`] | Ping, single and bulk lookup |
//! | `/_matrix/identity/api/v1/pubkey/*` | [`routes::pubkey`] | Signing key publication |
//! | `/health/*` | this module | Liveness and readiness probes |
//! | `/metrics` | this module | Prometheus scrape endpoint |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → CORS → MetricsMiddleware → body limit → Handler
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;

use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Request bodies above this size are rejected.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let mut identity = Router::new()
        .merge(routes::lookup::router())
        .merge(routes::pubkey::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    if let Some(metrics) = &state.metrics {
        identity = identity
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let identity = identity
        .layer(CorsLayer::permissive())
        .layer(middleware::tracing_layer::layer())
        .with_state(state.clone());

    let mut ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    if let Some(metrics) = &state.metrics {
        ops = ops
            .route("/metrics", get(prometheus_metrics))
            .layer(Extension(metrics.clone()));
    }

    Router::new().merge(ops.with_state(state)).merge(identity)
}

/// GET /metrics: Prometheus scrape endpoint.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    metrics
        .signing_key_ephemeral()
        .set(if state.signing.ephemeral { 1.0 } else { 0.0 });

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe: 200 whenever the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe. The signing key and providers are built before the
/// listener is bound, so a serving process is ready.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!(server_name = %state.signing.server_name, "readiness probe");
    "ready"
}
