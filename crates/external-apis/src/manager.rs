// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Failover orchestration across the providers of each source
//!
//! [`ProviderManager::execute_with_failover`] walks the capable providers of a
//! source in order: the preferred provider first, the rest by health score with
//! registration order breaking ties. Providers whose breaker is open, or half-open
//! with a trial already in flight, are skipped. Each outcome feeds the provider's
//! breaker and health record and is published on the [`EventBus`].
//!
//! A provider that rejects the operation locally with [`HttpError::Configuration`]
//! (a missing path value, an unsupported route) sent nothing, so its breaker and
//! health are left alone.

use std::{
    cmp::Reverse,
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http_client::{HealthCheckResult, HttpError, ValidationIssue};
use instrumentation::{EventBus, InstrumentationCollector};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use shared_types::{OperationKind, ProviderEvent};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{
    BenchmarkOptions, BenchmarkReport, CircuitBreakerConfig, CircuitBreakerState, CircuitStatus,
    Operation, Provider, ProviderAttempt, ProviderError, ProviderInit, ProviderRegistry,
    ProviderResult, ResilienceConfig, ResponseCache,
};

/// Result of a failover run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailoverExecutionResult<T> {
    /// Decoded response
    pub data: T,
    /// Provider that produced it
    pub provider_name: String,
}

/// Rolling health record of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    /// False after a failed call or probe until the next success
    pub is_healthy: bool,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Most recent error
    pub last_error: Option<String>,
    /// Mean duration of successful calls
    pub average_response_time_ms: f64,
    /// Successful calls
    pub total_successes: u64,
    /// Failed calls
    pub total_failures: u64,
    /// Last update
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            is_healthy: true,
            consecutive_failures: 0,
            last_error: None,
            average_response_time_ms: 0.0,
            total_successes: 0,
            total_failures: 0,
            last_checked: None,
        }
    }
}

impl ProviderHealth {
    #[allow(clippy::cast_precision_loss)]
    fn record_success(&mut self, elapsed: Duration, now: DateTime<Utc>) {
        let millis = elapsed.as_secs_f64() * 1000.0;
        self.total_successes += 1;
        self.average_response_time_ms +=
            (millis - self.average_response_time_ms) / self.total_successes as f64;
        self.consecutive_failures = 0;
        self.is_healthy = true;
        self.last_checked = Some(now);
    }

    fn record_failure(&mut self, error: &str, now: DateTime<Utc>) {
        self.total_failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.to_string());
        self.is_healthy = false;
        self.last_checked = Some(now);
    }
}

/// Point-in-time view of one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSnapshot {
    /// Provider name
    pub name: String,
    /// Registration priority
    pub priority: u32,
    /// Whether it is the source's preferred provider
    pub preferred: bool,
    /// Supported operations
    pub capabilities: Vec<OperationKind>,
    /// Effective breaker status
    pub circuit: CircuitStatus,
    /// Time until an open breaker admits a trial call
    pub retry_in_ms: Option<u64>,
    /// Rolling health record
    pub health: ProviderHealth,
}

type ProviderKey = (String, String);

/// Providers per source with breakers, health and failover
#[derive(Debug)]
pub struct ProviderManager {
    providers: DashMap<String, Vec<Arc<dyn Provider>>>,
    preferred: DashMap<String, String>,
    breakers: DashMap<ProviderKey, CircuitBreakerState>,
    health: DashMap<ProviderKey, ProviderHealth>,
    breaker_config: CircuitBreakerConfig,
    collector: Arc<InstrumentationCollector>,
    events: EventBus,
}

impl ProviderManager {
    /// An empty manager
    pub fn new(
        breaker_config: CircuitBreakerConfig,
        collector: Arc<InstrumentationCollector>,
        events: EventBus,
    ) -> Self {
        Self {
            providers: DashMap::new(),
            preferred: DashMap::new(),
            breakers: DashMap::new(),
            health: DashMap::new(),
            breaker_config,
            collector,
            events,
        }
    }

    /// Instantiate every enabled registered provider
    ///
    /// Providers that need a key nobody supplied are skipped with a warning, as is a
    /// preferred provider that ends up unregistered.
    ///
    /// # Errors
    ///
    /// Returns the first factory or registration error.
    pub fn from_config(
        registry: &ProviderRegistry,
        config: &ResilienceConfig,
        collector: Arc<InstrumentationCollector>,
        events: EventBus,
    ) -> ProviderResult<Self> {
        let manager = Self::new(config.breaker_config(), collector, events);

        for registration in registry.iter() {
            let metadata = &registration.metadata;
            let settings = config.provider_settings(&metadata.source, &metadata.name);
            if !settings.enabled {
                info!(source = %metadata.source, provider = %metadata.name, "provider disabled");
                continue;
            }

            let api_key = settings.resolve_api_key(metadata.api_key_env.as_deref());
            if metadata.requires_api_key && api_key.is_none() {
                warn!(
                    source = %metadata.source,
                    provider = %metadata.name,
                    env_var = metadata.api_key_env.as_deref().unwrap_or_default(),
                    "skipping provider without API key"
                );
                continue;
            }

            let init = ProviderInit {
                settings,
                api_key,
                collector: Arc::clone(&manager.collector),
                events: manager.events.clone(),
            };
            manager.register_provider((registration.factory)(init)?)?;
        }

        for (source, settings) in &config.sources {
            if let Some(preferred) = &settings.preferred_provider
                && let Err(error) = manager.set_preferred_provider(source, preferred)
            {
                warn!(%source, provider = %preferred, %error, "ignoring preferred provider");
            }
        }

        info!(
            sources = manager.providers.len(),
            providers = manager.breakers.len(),
            "provider manager ready"
        );
        Ok(manager)
    }

    /// Add a live provider under its declared source
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if the name is taken for that source.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) -> ProviderResult<()> {
        let source = provider.metadata().source.clone();
        let name = provider.name().to_string();
        let priority = provider.metadata().priority;

        {
            let mut providers = self.providers.entry(source.clone()).or_default();
            if providers.iter().any(|existing| existing.name() == name) {
                return Err(ProviderError::configuration(format!(
                    "provider {name} is already registered for source {source}"
                )));
            }
            let position = providers
                .iter()
                .position(|existing| existing.metadata().priority > priority)
                .unwrap_or(providers.len());
            providers.insert(position, provider);
        }

        let key = (source.clone(), name.clone());
        self.breakers
            .insert(key.clone(), CircuitBreakerState::new(self.breaker_config));
        self.health.insert(key, ProviderHealth::default());
        debug!(%source, provider = %name, priority, "provider registered");
        Ok(())
    }

    /// Always try `name` first for `source`
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] if it is not registered.
    pub fn set_preferred_provider(&self, source: &str, name: &str) -> ProviderResult<()> {
        if self.find(source, name).is_none() {
            return Err(ProviderError::UnknownProvider {
                source_name: source.to_string(),
                name: name.to_string(),
            });
        }
        self.preferred.insert(source.to_string(), name.to_string());
        Ok(())
    }

    /// Registered sources
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self
            .providers
            .iter()
            .map(|item| item.key().clone())
            .collect();
        sources.sort();
        sources
    }

    /// Providers of `source` in priority order
    pub fn providers(&self, source: &str) -> Vec<Arc<dyn Provider>> {
        self.providers
            .get(source)
            .map(|providers| providers.clone())
            .unwrap_or_default()
    }

    /// Shared metric sink
    pub fn collector(&self) -> &Arc<InstrumentationCollector> {
        &self.collector
    }

    /// Shared event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run `operation` against the providers of `source` until one succeeds
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoProviders`] or [`ProviderError::NoCapableProviders`]
    /// when there is nothing to try, [`ProviderError::InvalidOperation`] when every
    /// candidate rejected the operation without sending it, and
    /// [`ProviderError::AllProvidersFailed`] with one entry per candidate when every
    /// candidate failed or was skipped.
    pub async fn execute_with_failover(
        &self,
        source: &str,
        operation: &Operation,
    ) -> ProviderResult<FailoverExecutionResult<Value>> {
        self.run_failover(source, operation, Ok).await
    }

    /// Like [`execute_with_failover`](Self::execute_with_failover), decoding into `T`
    ///
    /// A body that does not decode counts as that provider's failure.
    ///
    /// # Errors
    ///
    /// Same as [`execute_with_failover`](Self::execute_with_failover).
    pub async fn execute_with_failover_as<T: DeserializeOwned>(
        &self,
        source: &str,
        operation: &Operation,
    ) -> ProviderResult<FailoverExecutionResult<T>> {
        self.run_failover(source, operation, |value| {
            serde_json::from_value(value).map_err(|error| HttpError::ResponseValidation {
                issues: vec![ValidationIssue::new("$", error.to_string())],
            })
        })
        .await
    }

    /// Serve from `cache` when fresh, otherwise fail over and store the result
    ///
    /// # Errors
    ///
    /// Same as [`execute_with_failover`](Self::execute_with_failover); failures are
    /// not cached.
    pub async fn execute_with_failover_cached(
        &self,
        cache: &ResponseCache,
        source: &str,
        operation: &Operation,
    ) -> ProviderResult<FailoverExecutionResult<Value>> {
        let key = operation.cache_key(source);
        if let Some((data, provider_name)) = cache.get(&key) {
            return Ok(FailoverExecutionResult {
                data,
                provider_name,
            });
        }

        let result = self.execute_with_failover(source, operation).await?;
        cache.insert(key, result.data.clone(), result.provider_name.clone());
        Ok(result)
    }

    async fn run_failover<T, F>(
        &self,
        source: &str,
        operation: &Operation,
        decode: F,
    ) -> ProviderResult<FailoverExecutionResult<T>>
    where
        F: Fn(Value) -> Result<T, HttpError>,
    {
        let candidates = self.candidates(source, operation.kind)?;
        let mut attempts = Vec::with_capacity(candidates.len());
        let mut rejected = 0;

        for (index, provider) in candidates.iter().enumerate() {
            let name = provider.name();
            if let Some(retry_in) = self.acquire(source, name, Utc::now()) {
                debug!(%source, provider = name, "skipping provider with open circuit");
                attempts.push(ProviderAttempt::circuit_open(name, millis(retry_in)));
                continue;
            }

            let started = Instant::now();
            let outcome = provider.execute(operation).await.and_then(&decode);
            let elapsed = started.elapsed();

            match outcome {
                Ok(data) => {
                    self.record_success(source, name, operation.kind, elapsed);
                    return Ok(FailoverExecutionResult {
                        data,
                        provider_name: name.to_string(),
                    });
                }
                Err(error @ HttpError::Configuration { .. }) => {
                    self.release_trial(source, name);
                    debug!(%source, provider = name, %error, "provider rejected operation");
                    attempts.push(ProviderAttempt::failed(name, &error));
                    rejected += 1;
                }
                Err(error) => {
                    self.record_failure(source, name, operation.kind, &error);
                    attempts.push(ProviderAttempt::failed(name, &error));

                    let now = Utc::now();
                    let next = candidates[index + 1..]
                        .iter()
                        .find(|next| self.blocked_for(source, next.name(), now).is_none());
                    if let Some(next) = next {
                        warn!(
                            %source,
                            from = name,
                            to = next.name(),
                            %error,
                            "failing over to next provider"
                        );
                        self.events.publish(ProviderEvent::Failover {
                            source: source.to_string(),
                            from: name.to_string(),
                            to: next.name().to_string(),
                            reason: error.to_string(),
                            timestamp: now,
                        });
                    }
                }
            }
        }

        if rejected == attempts.len() {
            return Err(ProviderError::InvalidOperation {
                source_name: source.to_string(),
                operation: operation.kind,
                attempts,
            });
        }

        warn!(
            %source,
            operation = %operation.kind,
            attempts = attempts.len(),
            "all providers failed"
        );
        Err(ProviderError::AllProvidersFailed {
            source_name: source.to_string(),
            operation: operation.kind,
            attempts,
        })
    }

    /// Capable providers in attempt order
    fn candidates(
        &self,
        source: &str,
        kind: OperationKind,
    ) -> ProviderResult<Vec<Arc<dyn Provider>>> {
        let registered = self.providers(source);
        if registered.is_empty() {
            return Err(ProviderError::NoProviders {
                source_name: source.to_string(),
            });
        }

        let mut candidates: Vec<_> = registered
            .into_iter()
            .filter(|provider| provider.supports(kind))
            .collect();
        if candidates.is_empty() {
            return Err(ProviderError::NoCapableProviders {
                source_name: source.to_string(),
                operation: kind,
            });
        }

        let preferred = self.preferred.get(source).map(|name| name.clone());
        let now = Utc::now();
        candidates.sort_by_cached_key(|provider| {
            let is_preferred = preferred.as_deref() == Some(provider.name());
            (!is_preferred, Reverse(self.health_score(source, provider.name(), now)))
        });
        Ok(candidates)
    }

    /// 100, minus breaker, failure-streak and latency penalties
    #[allow(clippy::cast_possible_truncation)]
    fn health_score(&self, source: &str, name: &str, now: DateTime<Utc>) -> i64 {
        let key = key(source, name);
        let breaker_penalty = self
            .breakers
            .get(&key)
            .map_or(0, |breaker| match breaker.status_at(now) {
                CircuitStatus::Closed => 0,
                CircuitStatus::HalfOpen => 50,
                CircuitStatus::Open => 100,
            });
        let (failure_penalty, latency_penalty) = self.health.get(&key).map_or((0, 0), |health| {
            (
                10 * i64::from(health.consecutive_failures),
                ((health.average_response_time_ms / 100.0) as i64).min(20),
            )
        });
        100 - breaker_penalty - failure_penalty - latency_penalty
    }

    /// Claim breaker admission; `Some` carries the wait before the next trial
    fn acquire(&self, source: &str, name: &str, now: DateTime<Utc>) -> Option<Duration> {
        let mut breaker = self.breakers.get_mut(&key(source, name))?;
        if breaker.try_acquire(now) {
            None
        } else {
            Some(breaker.time_until_retry(now).unwrap_or_default())
        }
    }

    fn release_trial(&self, source: &str, name: &str) {
        if let Some(mut breaker) = self.breakers.get_mut(&key(source, name)) {
            breaker.release_trial();
        }
    }

    fn blocked_for(&self, source: &str, name: &str, now: DateTime<Utc>) -> Option<Duration> {
        let breaker = self.breakers.get(&key(source, name))?;
        if breaker.can_attempt(now) {
            None
        } else {
            Some(breaker.time_until_retry(now).unwrap_or_default())
        }
    }

    fn record_success(
        &self,
        source: &str,
        name: &str,
        operation: OperationKind,
        elapsed: Duration,
    ) {
        let key = key(source, name);
        let now = Utc::now();
        if let Some(mut breaker) = self.breakers.get_mut(&key) {
            breaker.record_success();
        }
        if let Some(mut health) = self.health.get_mut(&key) {
            health.record_success(elapsed, now);
        }
        debug!(
            %source,
            provider = name,
            %operation,
            elapsed_ms = millis(elapsed),
            "provider succeeded"
        );
        self.events.publish(ProviderEvent::RequestSucceeded {
            source: source.to_string(),
            provider: name.to_string(),
            operation,
            duration_ms: millis(elapsed),
            timestamp: now,
        });
    }

    fn record_failure(
        &self,
        source: &str,
        name: &str,
        operation: OperationKind,
        error: &HttpError,
    ) {
        let key = key(source, name);
        let now = Utc::now();
        let reason = error.to_string();

        let opened = self
            .breakers
            .get_mut(&key)
            .is_some_and(|mut breaker| breaker.record_failure(now));
        if let Some(mut health) = self.health.get_mut(&key) {
            health.record_failure(&reason, now);
        }

        self.events.publish(ProviderEvent::RequestFailed {
            source: source.to_string(),
            provider: name.to_string(),
            operation,
            error: reason.clone(),
            timestamp: now,
        });
        if opened {
            warn!(%source, provider = name, %reason, "circuit opened");
            self.events.publish(ProviderEvent::CircuitOpen {
                source: source.to_string(),
                provider: name.to_string(),
                reason,
                timestamp: now,
            });
        }
    }

    /// Probe every provider concurrently
    ///
    /// Probes update each provider's health record but never its breaker.
    pub async fn check_all_health(
        &self,
    ) -> BTreeMap<String, BTreeMap<String, HealthCheckResult>> {
        let mut probes = JoinSet::new();
        for item in &self.providers {
            for provider in item.value() {
                let provider = Arc::clone(provider);
                let source = item.key().clone();
                probes.spawn(async move {
                    let result = provider.is_healthy().await;
                    (source, provider.name().to_string(), result)
                });
            }
        }

        let mut report: BTreeMap<String, BTreeMap<String, HealthCheckResult>> = BTreeMap::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((source, name, result)) => {
                    self.apply_probe(&source, &name, &result);
                    report.entry(source).or_default().insert(name, result);
                }
                Err(error) => warn!(%error, "health probe task failed"),
            }
        }
        report
    }

    /// Probe one provider
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] if it is not registered.
    pub async fn is_healthy(&self, source: &str, name: &str) -> ProviderResult<HealthCheckResult> {
        let provider = self.require(source, name)?;
        let result = provider.is_healthy().await;
        self.apply_probe(source, name, &result);
        Ok(result)
    }

    /// Benchmark one provider's sustainable rate
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] if it is not registered, or
    /// [`ProviderError::Provider`] when the benchmark itself fails.
    pub async fn benchmark_provider(
        &self,
        source: &str,
        name: &str,
        options: &BenchmarkOptions,
    ) -> ProviderResult<BenchmarkReport> {
        let provider = self.require(source, name)?;
        provider
            .benchmark_rate_limit(options)
            .await
            .map_err(|error| ProviderError::Provider {
                source_name: source.to_string(),
                name: name.to_string(),
                error,
            })
    }

    /// Health records of every provider of `source`
    pub fn provider_health(&self, source: &str) -> BTreeMap<String, ProviderHealth> {
        self.providers(source)
            .iter()
            .filter_map(|provider| {
                let health = self.health.get(&key(source, provider.name()))?;
                Some((provider.name().to_string(), health.clone()))
            })
            .collect()
    }

    /// Snapshots of every provider of `source` in priority order
    pub fn snapshots(&self, source: &str) -> Vec<ProviderSnapshot> {
        let now = Utc::now();
        let preferred = self.preferred.get(source).map(|name| name.clone());
        self.providers(source)
            .iter()
            .map(|provider| {
                let key = key(source, provider.name());
                let (circuit, retry_in_ms) = self.breakers.get(&key).map_or(
                    (CircuitStatus::Closed, None),
                    |breaker| {
                        (
                            breaker.status_at(now),
                            breaker.time_until_retry(now).map(millis),
                        )
                    },
                );
                ProviderSnapshot {
                    name: provider.name().to_string(),
                    priority: provider.metadata().priority,
                    preferred: preferred.as_deref() == Some(provider.name()),
                    capabilities: provider.metadata().capabilities.iter().copied().collect(),
                    circuit,
                    retry_in_ms,
                    health: self
                        .health
                        .get(&key)
                        .map(|health| health.clone())
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Copy of one breaker
    pub fn circuit_state(&self, source: &str, name: &str) -> Option<CircuitBreakerState> {
        self.breakers.get(&key(source, name)).map(|breaker| breaker.clone())
    }

    fn apply_probe(&self, source: &str, name: &str, result: &HealthCheckResult) {
        if let Some(mut health) = self.health.get_mut(&key(source, name)) {
            health.is_healthy = result.status.is_available();
            health.last_checked = Some(result.timestamp);
            if result.status.is_down() {
                health.last_error = Some(result.status.description().to_string());
            }
        }
    }

    fn find(&self, source: &str, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .get(source)?
            .iter()
            .find(|provider| provider.name() == name)
            .cloned()
    }

    fn require(&self, source: &str, name: &str) -> ProviderResult<Arc<dyn Provider>> {
        self.find(source, name)
            .ok_or_else(|| ProviderError::UnknownProvider {
                source_name: source.to_string(),
                name: name.to_string(),
            })
    }
}

fn key(source: &str, name: &str) -> ProviderKey {
    (source.to_string(), name.to_string())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
