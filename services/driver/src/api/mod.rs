//! HTTP API handlers and routing.

pub mod error;
mod health;
mod v1;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the host-facing router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .nest("/v1/driver", v1::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
