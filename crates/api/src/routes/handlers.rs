// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP request handlers module
//!
//! Health, Prometheus and summary endpoints, live provider status per source and
//! the cached failover fetch.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use external_apis::{Operation, ProviderError, ProviderSnapshot};
use instrumentation::{MetricsSummary, ProviderRow, exporter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::OperationKind;
use tracing::{debug, warn};

use crate::{error::ServerError, state::ServerState};

/// Health check endpoint handler
///
/// Probes every provider; answers 503 only when no source has a usable provider.
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let health = state.health_check().await;
    let status = if health.status.is_down() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(health))
}

/// Prometheus text exposition
pub async fn metrics_handler() -> Result<impl IntoResponse, ServerError> {
    let (content_type, body) = exporter::render()?;
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

/// Aggregate view of every retained request metric
pub async fn metrics_summary_handler(State(state): State<ServerState>) -> Json<MetricsSummary> {
    Json(state.manager().collector().get_summary())
}

/// Live status of one source's providers
#[derive(Debug, Serialize)]
pub struct SourceStatus {
    /// Source name
    pub source: String,
    /// Display rows, busiest first
    pub rows: Vec<ProviderRow>,
    /// Breaker and health snapshot per provider, in priority order
    pub providers: Vec<ProviderSnapshot>,
}

/// Provider status rows for a source
pub async fn providers_handler(
    State(state): State<ServerState>,
    Path(source): Path<String>,
) -> Result<Json<SourceStatus>, ServerError> {
    let providers = state.manager().snapshots(&source);
    if providers.is_empty() {
        return Err(ProviderError::NoProviders {
            source_name: source,
        }
        .into());
    }

    Ok(Json(SourceStatus {
        rows: state.provider_rows(&source),
        source,
        providers,
    }))
}

/// Query parameters of the fetch endpoint
#[derive(Debug, Default, Deserialize)]
pub struct FetchQuery {
    /// Lower bound passed to providers as `{since}`
    pub since: Option<u64>,
}

/// Body of a successful fetch
#[derive(Debug, Serialize)]
pub struct FetchResponse {
    /// Provider that produced `data`
    pub provider: String,
    /// Provider response body
    pub data: Value,
}

/// Run one operation with failover, served from the response cache when fresh
///
/// # Errors
///
/// Returns 400 for an unknown operation, 404 for an unknown source and 502 with
/// every provider attempt when failover is exhausted.
pub async fn fetch_handler(
    State(state): State<ServerState>,
    Path((source, operation, address)): Path<(String, String, String)>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<FetchResponse>, ServerError> {
    let kind: OperationKind = operation
        .parse()
        .map_err(|error: shared_types::ParseOperationKindError| {
            ServerError::ValidationError(error.to_string())
        })?;

    let mut operation = Operation::for_address(kind, address);
    if let Some(since) = query.since {
        operation = operation.since(since);
    }

    let result = state
        .manager()
        .execute_with_failover_cached(state.cache(), &source, &operation)
        .await
        .inspect_err(|error| warn!(%source, operation = %kind, %error, "fetch failed"))?;

    debug!(%source, operation = %kind, provider = %result.provider_name, "fetch served");
    Ok(Json(FetchResponse {
        provider: result.provider_name,
        data: result.data,
    }))
}
