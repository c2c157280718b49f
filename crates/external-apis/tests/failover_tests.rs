// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for `ProviderManager` failover over real HTTP providers
//!
//! Each provider is a [`JsonRestProvider`] pointed at its own wiremock server, so
//! the client retry loop, circuit breakers and event bus run end to end.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::Utc;
use external_apis::{
    AttemptOutcome, BenchmarkOptions, CircuitBreakerConfig, CircuitStatus, HealthCheck,
    JsonRestProvider, JsonRestSpec, Operation, Provider, ProviderError, ProviderInit,
    ProviderManager, ProviderMetadata, ProviderSettings, ResponseCache, RestRoute,
    TimeoutMillis,
};
use http_client::HealthStatus;
use instrumentation::{EventBus, InstrumentationCollector, ProviderStateAggregator};
use serde_json::{Value, json};
use shared_types::{OperationKind, ProviderEvent, ProviderStatus, RateLimitConfig};
use tokio::sync::broadcast::Receiver;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

const TEST_SOURCE: &str = "bitcoin";
const TEST_ADDRESS: &str = "bc1qtest";
const TEST_TIMEOUT_MS: u64 = 2_000;
const TEST_MAX_RETRIES: u32 = 1;

/// Create a provider spec rooted at the mock server URL
fn create_test_spec(name: &str, priority: u32, base_url: &str) -> JsonRestSpec {
    let routes = BTreeMap::from([(
        OperationKind::GetAddressBalance,
        RestRoute::get("address/{address}"),
    )]);
    JsonRestSpec {
        metadata: ProviderMetadata {
            name: name.to_string(),
            source: TEST_SOURCE.to_string(),
            priority,
            rate_limit: RateLimitConfig::per_second(1000.0, 100),
            capabilities: routes.keys().copied().collect(),
            base_url: base_url.to_string(),
            api_key_env: None,
            requires_api_key: false,
            health_check: HealthCheck::any_json("status"),
        },
        routes,
        api_key: None,
    }
}

/// Create settings with a single attempt per request
fn create_test_settings() -> ProviderSettings {
    ProviderSettings {
        timeout_ms: Some(TimeoutMillis::new(TEST_TIMEOUT_MS).unwrap()),
        max_retries: Some(TEST_MAX_RETRIES),
        ..ProviderSettings::default()
    }
}

struct TestHarness {
    manager: ProviderManager,
    events: Receiver<ProviderEvent>,
    servers: Vec<MockServer>,
}

/// Create a manager with one mock-backed provider per name, in priority order
async fn create_test_harness(names: &[&str], breaker: CircuitBreakerConfig) -> TestHarness {
    let collector = Arc::new(InstrumentationCollector::new());
    let bus = EventBus::new(64);
    let events = bus.subscribe();
    let manager = ProviderManager::new(breaker, Arc::clone(&collector), bus.clone());

    let mut servers = Vec::with_capacity(names.len());
    for (priority, name) in (0u32..).zip(names) {
        let server = MockServer::start().await;
        let init = ProviderInit::new(Arc::clone(&collector), bus.clone())
            .with_settings(create_test_settings());
        let provider =
            JsonRestProvider::new(create_test_spec(name, priority, &server.uri()), init).unwrap();
        manager.register_provider(Arc::new(provider)).unwrap();
        servers.push(server);
    }

    TestHarness {
        manager,
        events,
        servers,
    }
}

async fn mount_balance(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/address/{TEST_ADDRESS}")))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

fn balance_operation() -> Operation {
    Operation::for_address(OperationKind::GetAddressBalance, TEST_ADDRESS)
}

fn drain(events: &mut Receiver<ProviderEvent>) -> Vec<ProviderEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Test that the third provider answers after the first two fail
#[tokio::test]
async fn failover_reaches_third_provider() {
    let mut harness =
        create_test_harness(&["alpha", "beta", "gamma"], CircuitBreakerConfig::default()).await;
    mount_balance(&harness.servers[0], 503, json!({"error": "maintenance"})).await;
    mount_balance(&harness.servers[1], 500, json!({"error": "boom"})).await;
    mount_balance(&harness.servers[2], 200, json!({"funded_txo_sum": 5000})).await;

    let result = harness
        .manager
        .execute_with_failover(TEST_SOURCE, &balance_operation())
        .await
        .unwrap();

    assert_eq!(result.provider_name, "gamma");
    assert_eq!(result.data, json!({"funded_txo_sum": 5000}));

    let events = drain(&mut harness.events);
    let failovers: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ProviderEvent::Failover { from, to, .. } => Some((from.as_str(), to.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(failovers, vec![("alpha", "beta"), ("beta", "gamma")]);

    for name in ["alpha", "beta"] {
        let breaker = harness.manager.circuit_state(TEST_SOURCE, name).unwrap();
        assert_eq!(breaker.consecutive_failures, 1);
        assert_eq!(breaker.status, CircuitStatus::Closed);
    }
    let gamma = harness.manager.circuit_state(TEST_SOURCE, "gamma").unwrap();
    assert_eq!(gamma.consecutive_failures, 0);

    let metrics = harness.manager.collector().get_metrics();
    let statuses: Vec<_> = metrics.iter().map(|metric| metric.status).collect();
    assert_eq!(statuses, vec![503, 500, 200]);
}

/// Test that an open breaker keeps its provider out of the next call
#[tokio::test]
async fn open_breaker_skips_provider() {
    let breaker = CircuitBreakerConfig {
        failure_threshold: 1,
        cooldown: Duration::from_secs(300),
    };
    let mut harness = create_test_harness(&["alpha", "beta"], breaker).await;
    Mock::given(method("GET"))
        .and(path(format!("/address/{TEST_ADDRESS}")))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&harness.servers[0])
        .await;
    mount_balance(&harness.servers[1], 200, json!({"balance": 1})).await;

    for _ in 0..2 {
        let result = harness
            .manager
            .execute_with_failover(TEST_SOURCE, &balance_operation())
            .await
            .unwrap();
        assert_eq!(result.provider_name, "beta");
    }

    let alpha = harness.manager.circuit_state(TEST_SOURCE, "alpha").unwrap();
    assert_eq!(alpha.status_at(Utc::now()), CircuitStatus::Open);
    assert!(!alpha.can_attempt(Utc::now()));

    let kinds: Vec<_> = drain(&mut harness.events)
        .iter()
        .map(ProviderEvent::kind)
        .collect();
    assert_eq!(kinds.iter().filter(|kind| **kind == "circuit_open").count(), 1);

    let snapshot = harness.manager.snapshots(TEST_SOURCE);
    assert_eq!(snapshot[0].name, "alpha");
    assert_eq!(snapshot[0].circuit, CircuitStatus::Open);
    assert!(snapshot[0].retry_in_ms.is_some());
}

/// Test that exhausting every provider reports each attempt
#[tokio::test]
async fn all_providers_failed_lists_attempts() {
    let harness = create_test_harness(&["alpha", "beta"], CircuitBreakerConfig::default()).await;
    mount_balance(&harness.servers[0], 503, json!({"error": "down"})).await;
    mount_balance(&harness.servers[1], 404, json!({"error": "unknown address"})).await;

    let error = tokio_test::assert_err!(
        harness
            .manager
            .execute_with_failover(TEST_SOURCE, &balance_operation())
            .await
    );

    assert_eq!(error.code(), "ALL_PROVIDERS_FAILED");
    let ProviderError::AllProvidersFailed { attempts, .. } = error else {
        unreachable!("expected AllProvidersFailed");
    };
    let providers: Vec<_> = attempts.iter().map(|attempt| attempt.provider.as_str()).collect();
    assert_eq!(providers, vec!["alpha", "beta"]);
    assert!(matches!(
        &attempts[0].outcome,
        AttemptOutcome::Failed { code, .. } if code == "SERVICE_ERROR"
    ));
    assert!(matches!(
        &attempts[1].outcome,
        AttemptOutcome::Failed { code, .. } if code == "HTTP_ERROR"
    ));
}

/// Test that a cached result is served without another provider call
#[tokio::test]
async fn cached_execution_hits_provider_once() {
    let harness = create_test_harness(&["alpha"], CircuitBreakerConfig::default()).await;
    Mock::given(method("GET"))
        .and(path(format!("/address/{TEST_ADDRESS}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balance": 42})))
        .expect(1)
        .mount(&harness.servers[0])
        .await;

    let cache = ResponseCache::new();
    for _ in 0..3 {
        let result = harness
            .manager
            .execute_with_failover_cached(&cache, TEST_SOURCE, &balance_operation())
            .await
            .unwrap();
        assert_eq!(result.provider_name, "alpha");
        assert_eq!(result.data, json!({"balance": 42}));
    }

    let stats = cache.get_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.hits_by_provider.get("alpha"), Some(&2));
}

/// Test that a throttled provider shows as rate limited and the next one answers
#[tokio::test]
async fn rate_limited_provider_fails_over() {
    let mut harness =
        create_test_harness(&["alpha", "beta"], CircuitBreakerConfig::default()).await;
    Mock::given(method("GET"))
        .and(path(format!("/address/{TEST_ADDRESS}")))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&harness.servers[0])
        .await;
    mount_balance(&harness.servers[1], 200, json!({"balance": 7})).await;

    let result = harness
        .manager
        .execute_with_failover(TEST_SOURCE, &balance_operation())
        .await
        .unwrap();
    assert_eq!(result.provider_name, "beta");

    let aggregator = ProviderStateAggregator::new();
    let events = drain(&mut harness.events);
    for event in &events {
        aggregator.track_event(event);
    }
    assert!(events.iter().any(|event| matches!(
        event,
        ProviderEvent::RateLimited { provider, .. } if provider == "alpha"
    )));

    let metrics = harness.manager.collector().get_metrics();
    let rows = aggregator.get_provider_rows(&metrics, TEST_SOURCE, Utc::now());
    let alpha = rows.iter().find(|row| row.provider == "alpha").unwrap();
    assert_eq!(alpha.status, ProviderStatus::RateLimited);
    assert!(alpha.rate_limit_remaining_ms.is_some());
    let beta = rows.iter().find(|row| row.provider == "beta").unwrap();
    assert_ne!(beta.status, ProviderStatus::RateLimited);
}

/// Test that query templates and the API key reach the wire
#[tokio::test]
async fn query_routes_carry_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("module", "account"))
        .and(query_param("address", "0xabc"))
        .and(query_param("apikey", "secret-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "1", "result": "100"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut spec = create_test_spec("etherscan", 0, &server.uri());
    spec.metadata.source = "ethereum".to_string();
    spec.routes = BTreeMap::from([(
        OperationKind::GetAddressBalance,
        RestRoute::get("api")
            .query("module", "account")
            .query("address", "{address}"),
    )]);
    spec.api_key = Some(http_client::ApiKeyPlacement::Query {
        name: "apikey".to_string(),
    });

    let init = ProviderInit::new(Arc::new(InstrumentationCollector::new()), EventBus::default())
        .with_settings(create_test_settings())
        .with_api_key("secret-key".parse().unwrap());
    let provider = JsonRestProvider::new(spec, init).unwrap();

    let body = provider
        .execute(&Operation::for_address(OperationKind::GetAddressBalance, "0xabc"))
        .await
        .unwrap();
    assert_eq!(body["result"], "100");
}

/// Test that the health sweep probes every provider without touching breakers
#[tokio::test]
async fn health_sweep_reports_each_provider() {
    let harness = create_test_harness(&["alpha", "beta"], CircuitBreakerConfig::default()).await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&harness.servers[0])
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&harness.servers[1])
        .await;

    let report = harness.manager.check_all_health().await;
    let bitcoin = &report[TEST_SOURCE];
    assert!(bitcoin["alpha"].status.is_available());
    assert!(!bitcoin["beta"].status.is_available());

    let health = harness.manager.provider_health(TEST_SOURCE);
    assert!(health["alpha"].is_healthy);
    assert!(!health["beta"].is_healthy);
    let beta = harness.manager.circuit_state(TEST_SOURCE, "beta").unwrap();
    assert_eq!(beta.consecutive_failures, 0);
}

/// Test that benchmarking stops at the first throttled rate
#[tokio::test]
async fn benchmark_recommends_below_first_throttle() {
    let harness = create_test_harness(&["alpha"], CircuitBreakerConfig::default()).await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .up_to_n_times(4)
        .mount(&harness.servers[0])
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&harness.servers[0])
        .await;

    let options = BenchmarkOptions {
        rates: vec![50.0, 100.0],
        requests_per_rate: 3,
        safety_factor: 0.5,
        pause: Duration::ZERO,
    };
    let report = harness
        .manager
        .benchmark_provider(TEST_SOURCE, "alpha", &options)
        .await
        .unwrap();

    assert_eq!(report.provider, "alpha");
    assert_eq!(report.probes.len(), 2);
    assert!(!report.probes[0].rate_limited);
    assert!(report.probes[1].rate_limited);
    assert_eq!(report.probes[1].succeeded, 1);
    assert_eq!(report.max_clean_rate, Some(50.0));
    assert!((report.recommended.requests_per_second - 25.0).abs() < f64::EPSILON);
    assert_eq!(report.recommended.burst_limit, 25);

    let error = harness
        .manager
        .benchmark_provider(TEST_SOURCE, "missing", &options)
        .await
        .unwrap_err();
    assert_eq!(error.code(), "UNKNOWN_PROVIDER");
}

/// Test that an operation missing its address never trips a breaker
#[tokio::test]
async fn incomplete_operation_leaves_breakers_closed() {
    let breaker = CircuitBreakerConfig {
        failure_threshold: 3,
        cooldown: Duration::from_secs(300),
    };
    let mut harness = create_test_harness(&["alpha", "beta"], breaker).await;
    Mock::given(method("GET"))
        .and(path(format!("/address/{TEST_ADDRESS}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balance": 3})))
        .expect(1)
        .mount(&harness.servers[0])
        .await;

    let incomplete = Operation::new(OperationKind::GetAddressBalance);
    for _ in 0..3 {
        let error = tokio_test::assert_err!(
            harness
                .manager
                .execute_with_failover(TEST_SOURCE, &incomplete)
                .await
        );
        assert_eq!(error.code(), "INVALID_OPERATION");
    }

    for name in ["alpha", "beta"] {
        let breaker = harness.manager.circuit_state(TEST_SOURCE, name).unwrap();
        assert_eq!(breaker.status, CircuitStatus::Closed);
        assert_eq!(breaker.consecutive_failures, 0);
    }
    assert!(
        !drain(&mut harness.events)
            .iter()
            .any(|event| matches!(event, ProviderEvent::CircuitOpen { .. }))
    );

    let result = harness
        .manager
        .execute_with_failover(TEST_SOURCE, &balance_operation())
        .await
        .unwrap();
    assert_eq!(result.provider_name, "alpha");
}

/// Test that health checks wait on the provider's rate limit
#[tokio::test]
async fn health_checks_respect_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let mut spec = create_test_spec("alpha", 0, &server.uri());
    spec.metadata.rate_limit = RateLimitConfig::per_second(1.0, 1).with_per_minute(1);
    let init = ProviderInit::new(Arc::new(InstrumentationCollector::new()), EventBus::default())
        .with_settings(create_test_settings());
    let provider = JsonRestProvider::new(spec, init).unwrap();

    let first = provider.is_healthy().await;
    assert!(matches!(first.status, HealthStatus::Up));
    for _ in 0..4 {
        let throttled = provider.is_healthy().await;
        assert!(matches!(throttled.status, HealthStatus::Degraded { .. }));
    }
}
