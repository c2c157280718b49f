// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server state management module
//!
//! Shared handles passed to every handler: the provider manager, the live status
//! aggregator, the response cache and the shutdown token.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use external_apis::{ProviderManager, ResponseCache};
use http_client::{HealthCheckResult, HealthStatus};
use instrumentation::{ProviderRow, ProviderStateAggregator};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{Environment, ServerConfig};

/// Shared application state with cancellation token support
#[derive(Debug, Clone)]
pub struct ServerState {
    config: ServerConfig,
    manager: Arc<ProviderManager>,
    aggregator: Arc<ProviderStateAggregator>,
    cache: Arc<ResponseCache>,
    /// Cancellation token for coordinated shutdown
    pub cancellation_token: CancellationToken,
}

impl ServerState {
    /// Create new server state
    pub fn new(
        config: ServerConfig,
        manager: Arc<ProviderManager>,
        aggregator: Arc<ProviderStateAggregator>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let cache = Arc::new(ResponseCache::with_settings(
            config.cache.ttl(),
            config.cache.max_entries,
        ));
        Self {
            config,
            manager,
            aggregator,
            cache,
            cancellation_token,
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Provider manager
    pub fn manager(&self) -> &Arc<ProviderManager> {
        &self.manager
    }

    /// Live status aggregator
    pub fn aggregator(&self) -> &Arc<ProviderStateAggregator> {
        &self.aggregator
    }

    /// Response cache used by the fetch endpoint
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Probe every provider concurrently
    ///
    /// The gateway is up when every source has at least one available provider,
    /// degraded when some do, and down when none do.
    pub async fn health_check(&self) -> HealthCheck {
        let providers = self.manager.check_all_health().await;

        let sources = providers.len();
        let available = providers
            .values()
            .filter(|results| results.values().any(|result| result.status.is_available()))
            .count();
        let status = if available == sources {
            HealthStatus::Up
        } else if available > 0 {
            let unavailable = sources - available;
            HealthStatus::Degraded {
                reason: format!("{unavailable} of {sources} sources have no available provider"),
            }
        } else {
            HealthStatus::Down {
                reason: "no source has an available provider".to_string(),
            }
        };

        HealthCheck {
            status,
            version: Box::from(env!("CARGO_PKG_VERSION")),
            environment: self.config.environment,
            timestamp: Utc::now().to_rfc3339(),
            providers,
        }
    }

    /// Status rows for one source
    pub fn provider_rows(&self, source: &str) -> Vec<ProviderRow> {
        let metrics = self.manager.collector().get_metrics();
        self.aggregator
            .get_provider_rows(&metrics, source, Utc::now())
    }
}

/// Gateway health with per-provider probe results
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    /// Overall status
    pub status: HealthStatus,
    /// Service version
    pub version: Box<str>,
    /// Environment
    pub environment: Environment,
    /// Timestamp
    pub timestamp: String,
    /// Probe results by source, then provider
    pub providers: BTreeMap<String, BTreeMap<String, HealthCheckResult>>,
}
