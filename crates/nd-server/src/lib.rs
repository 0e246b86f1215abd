//! Newsdesk HTTP API server (Axum).
//!
//! Provides the admin cleanup and sweep endpoints, mention ingest and
//! retrieval, the source/overview/spike reports, article flagging, and health.

pub mod error;
pub mod feed;
pub mod routes;
pub mod state;

use axum::http::Request;
use axum::Router;
use state::AppState;
use tower_http::trace::TraceLayer;

/// Build the application router over an in-memory store with default config.
pub fn app() -> Router {
    app_with_state(AppState::default())
}

/// Build the application router with a custom state.
pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::admin_routes())
        .merge(routes::mention_routes())
        .merge(routes::analysis_routes())
        .merge(routes::flag_routes())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            // Path only; the query can carry the admin key.
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path()
            )
        }))
        .with_state(state)
}
