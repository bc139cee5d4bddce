//! Route modules for the listmatch server

pub mod health;
pub mod listmatch;

use axum::{
    http::{Method, Request},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    // Any origin may call the protocol endpoints; the name is the only secret
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    // Spans carry the path only; the query string holds the upload name
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        tracing::debug_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    });

    Router::new()
        .merge(health::router())
        .merge(listmatch::router(&state.config().server.path_prefix))
        .fallback(listmatch::browser_notice)
        .layer(trace)
        .layer(cors)
        .with_state(state)
}
