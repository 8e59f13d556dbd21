//! Webterm server library - HTTP server exposing a shell session to a browser.
//!
//! The router is built here rather than in main.rs so integration tests can
//! run against the full application.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/execute", post(routes::execute::execute))
        .route("/complete", post(routes::complete::complete))
        .route("/health", get(routes::health));

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
