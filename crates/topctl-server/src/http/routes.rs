// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route definitions and middleware stacking.

use crate::http::{handlers, middleware};
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/expectation", get(handlers::expectation))
        .route("/reality", get(handlers::reality))
        .route("/details", get(handlers::details))
        .route("/sync", post(handlers::sync))
        .route("/services/{service}/queues", get(handlers::service_queues))
        .layer(axum::middleware::from_fn(middleware::timeout))
        .layer(axum::middleware::from_fn(middleware::trace_id))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
