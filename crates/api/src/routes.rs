// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! Route table for the provider gateway.

pub mod handlers;

use axum::{Router, routing::get};
use handlers::{
    fetch_handler, health_handler, metrics_handler, metrics_summary_handler, providers_handler,
};

use crate::state::ServerState;

/// Create application routes
pub fn create_routes() -> Router<ServerState> {
    // Operational endpoints stay outside the versioned API
    let ops_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    let api_routes = Router::new()
        .route("/metrics/summary", get(metrics_summary_handler))
        .route("/sources/{source}/providers", get(providers_handler))
        .route("/sources/{source}/{operation}/{address}", get(fetch_handler));

    Router::new()
        .merge(ops_routes)
        .nest("/v1", api_routes)
}
