// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Provider orchestration for blockchain data sources
//!
//! Turns several interchangeable third-party APIs per logical source into one
//! dependable fetch capability.
//!
//! # Architecture
//!
//! - **Providers**: [`Provider`] trait, config-driven [`JsonRestProvider`] and the
//!   builtin [`catalog`] (bitcoin and ethereum explorers)
//! - **Registry**: [`ProviderRegistry`] maps `(source, name)` to a factory; nothing
//!   is discovered at runtime
//! - **Failover**: [`ProviderManager`] orders candidates, consults each provider's
//!   [`CircuitBreakerState`] and moves on when one fails
//! - **Caching**: [`ResponseCache`] keyed by [`Operation::cache_key`], opt-in
//! - **Configuration**: [`ResilienceConfig`] with validated [`NonEmptyString`] and
//!   [`TimeoutMillis`] values
//!
//! # Features
//!
//! - **Automatic Failover**: preferred provider first, then by health score
//! - **Circuit Breaking**: threshold, cooldown and single half-open trial per provider
//! - **Concurrent Health Checks**: every provider probed in its own task
//! - **Rate-Limit Benchmarking**: probe a provider and get a recommended limit

pub mod benchmark;
pub mod cache;
pub mod catalog;
pub mod circuit_breaker;
pub mod error;
pub mod json_rest;
pub mod manager;
pub mod operation;
pub mod provider;
pub mod registry;
pub mod settings;
pub mod validated;

pub use benchmark::{BenchmarkOptions, BenchmarkProbe, BenchmarkReport, run_benchmark};
pub use cache::{CachedResponse, ResponseCache, ResponseCacheStats};
pub use catalog::{BITCOIN, ETHEREUM, register_builtin_providers};
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerState, CircuitStatus};
pub use error::{AttemptOutcome, ProviderAttempt, ProviderError, ProviderResult};
pub use json_rest::{JsonRestProvider, JsonRestSpec, RestRoute};
pub use manager::{FailoverExecutionResult, ProviderHealth, ProviderManager, ProviderSnapshot};
pub use operation::Operation;
pub use provider::{HealthCheck, HealthValidator, Provider, ProviderFuture, ProviderMetadata};
pub use registry::{ProviderFactory, ProviderInit, ProviderRegistration, ProviderRegistry};
pub use settings::{
    CircuitBreakerSettings, ConfigError, ProviderSettings, ResilienceConfig, SourceSettings,
};
pub use validated::{NonEmptyString, TimeoutMillis, ValidationError};
