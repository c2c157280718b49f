// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! The provider abstraction
//!
//! A [`Provider`] is one third-party API serving one logical source. Its
//! [`ProviderMetadata`] is fixed at registration; the manager only ever talks to it
//! through [`Provider::execute`], [`Provider::is_healthy`] and
//! [`Provider::benchmark_rate_limit`].

use std::{collections::BTreeSet, fmt, future::Future, pin::Pin};

use http_client::{HealthCheckResult, HttpError};
use serde_json::Value;
use shared_types::{OperationKind, RateLimitConfig};

use crate::{BenchmarkOptions, BenchmarkReport, Operation};

/// Boxed future returned by provider methods
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, HttpError>> + Send + 'a>>;

/// Accepts or rejects a health-check response body
pub type HealthValidator = fn(&Value) -> bool;

/// Request a provider answers to prove it is up
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Endpoint relative to the provider base URL
    pub endpoint: String,
    /// Body check; a 2xx whose body fails it counts as down
    pub validator: HealthValidator,
}

impl HealthCheck {
    /// A health check with a validator
    pub fn new(endpoint: impl Into<String>, validator: HealthValidator) -> Self {
        Self {
            endpoint: endpoint.into(),
            validator,
        }
    }

    /// A health check that accepts any JSON body
    pub fn any_json(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, |_| true)
    }
}

/// Identity and declared behaviour of a provider
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Provider name, unique within its source
    pub name: String,
    /// Logical source served, e.g. `bitcoin`
    pub source: String,
    /// Registration priority, lower first
    pub priority: u32,
    /// Declared limits
    pub rate_limit: RateLimitConfig,
    /// Supported operations
    pub capabilities: BTreeSet<OperationKind>,
    /// Default base URL
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Whether the provider refuses requests without a key
    pub requires_api_key: bool,
    /// Liveness probe
    pub health_check: HealthCheck,
}

impl ProviderMetadata {
    /// Whether `kind` is among the capabilities
    pub fn supports(&self, kind: OperationKind) -> bool {
        self.capabilities.contains(&kind)
    }
}

/// One third-party API serving one logical source
pub trait Provider: Send + Sync + fmt::Debug {
    /// Static description
    fn metadata(&self) -> &ProviderMetadata;

    /// Run an operation and return the provider's raw JSON
    fn execute<'a>(&'a self, operation: &'a Operation) -> ProviderFuture<'a, Value>;

    /// Run the declared health check
    fn is_healthy(&self) -> Pin<Box<dyn Future<Output = HealthCheckResult> + Send + '_>>;

    /// Probe sustainable throughput and recommend a rate limit
    fn benchmark_rate_limit<'a>(
        &'a self,
        options: &'a BenchmarkOptions,
    ) -> ProviderFuture<'a, BenchmarkReport> {
        let _ = options;
        Box::pin(async move {
            Err(HttpError::configuration(format!(
                "{} does not support rate-limit benchmarking",
                self.metadata().name
            )))
        })
    }

    /// Provider name
    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Whether the provider can run `kind`
    fn supports(&self, kind: OperationKind) -> bool {
        self.metadata().supports(kind)
    }
}
