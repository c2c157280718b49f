// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the gateway endpoints
//!
//! A test server is started on an ephemeral port over a manager whose providers
//! point at wiremock servers.

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use api::{Server, ServerConfig, ShutdownConfig};
use axum::http::StatusCode;
use external_apis::{
    CircuitBreakerConfig, HealthCheck, JsonRestProvider, JsonRestSpec, ProviderInit,
    ProviderManager, ProviderMetadata, ProviderSettings, RestRoute,
};
use instrumentation::{EventBus, InstrumentationCollector};
use serde_json::{Value, json};
use shared_types::{OperationKind, RateLimitConfig};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

const TEST_SOURCE: &str = "bitcoin";
const TEST_ADDRESS: &str = "bc1qgateway";

/// Create a provider spec rooted at the mock server URL
fn create_test_spec(name: &str, priority: u32, base_url: &str) -> JsonRestSpec {
    let routes = BTreeMap::from([(
        OperationKind::GetAddressTransactions,
        RestRoute::get("address/{address}/txs").query("after", "{since}"),
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

/// Start a gateway over one provider per mock server, in priority order
async fn start_test_gateway(servers: &[(&str, &MockServer)]) -> SocketAddr {
    let collector = Arc::new(InstrumentationCollector::new());
    let events = EventBus::default();
    let manager = ProviderManager::new(
        CircuitBreakerConfig::default(),
        Arc::clone(&collector),
        events.clone(),
    );
    for (priority, (name, server)) in (0u32..).zip(servers) {
        let init = ProviderInit::new(Arc::clone(&collector), events.clone()).with_settings(
            ProviderSettings {
                max_retries: Some(1),
                ..ProviderSettings::default()
            },
        );
        let provider =
            JsonRestProvider::new(create_test_spec(name, priority, &server.uri()), init).unwrap();
        manager.register_provider(Arc::new(provider)).unwrap();
    }

    let server = Server::with_manager(
        ServerConfig::for_testing(),
        ShutdownConfig::default(),
        Arc::new(manager),
    );
    let (addr, _) = tokio_test::assert_ok!(server.run_for_testing().await);
    addr
}

fn fetch_url(addr: SocketAddr, operation: &str) -> String {
    format!("http://{addr}/v1/sources/{TEST_SOURCE}/{operation}/{TEST_ADDRESS}")
}

/// Test that a fetch fails over and then serves the cached answer
#[tokio::test]
async fn fetch_fails_over_and_caches() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/address/{TEST_ADDRESS}/txs")))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/address/{TEST_ADDRESS}/txs")))
        .and(query_param("after", "1700000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"txid": "abc"}])))
        .expect(1)
        .mount(&backup)
        .await;

    let addr = start_test_gateway(&[("primary", &primary), ("backup", &backup)]).await;
    let client = reqwest::Client::new();
    let url = format!("{}?since=1700000000", fetch_url(addr, "getAddressTransactions"));

    for _ in 0..2 {
        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["provider"], "backup");
        assert_eq!(body["data"][0]["txid"], "abc");
    }
}

/// Test that exhausted failover answers 502 with every attempt
#[tokio::test]
async fn exhausted_failover_is_bad_gateway() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    for (server, status) in [(&primary, 500), (&backup, 404)] {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    let addr = start_test_gateway(&[("primary", &primary), ("backup", &backup)]).await;
    let response = reqwest::get(fetch_url(addr, "getAddressTransactions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ALL_PROVIDERS_FAILED");
    let attempts = body["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["provider"], "primary");
    assert_eq!(attempts[0]["code"], "SERVICE_ERROR");
    assert_eq!(attempts[1]["code"], "HTTP_ERROR");
}

/// Test request validation and unknown sources
#[tokio::test]
async fn invalid_requests_are_rejected() {
    let primary = MockServer::start().await;
    let addr = start_test_gateway(&[("primary", &primary)]).await;

    let response = reqwest::get(fetch_url(addr, "getEverything")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = reqwest::get(fetch_url(addr, "getTokenBalances")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

    let response = reqwest::get(format!("http://{addr}/v1/sources/solana/providers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Test the status, summary, metrics and health views after traffic
#[tokio::test]
async fn observability_endpoints_reflect_traffic() {
    let primary = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/address/{TEST_ADDRESS}/txs")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&primary)
        .await;

    let addr = start_test_gateway(&[("primary", &primary)]).await;
    let client = reqwest::Client::new();
    let response = client
        .get(fetch_url(addr, "getAddressTransactions"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status: Value = client
        .get(format!("http://{addr}/v1/sources/{TEST_SOURCE}/providers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["source"], TEST_SOURCE);
    assert_eq!(status["rows"][0]["provider"], "primary");
    assert_eq!(status["rows"][0]["total_requests"], 1);
    assert_eq!(status["providers"][0]["circuit"], "closed");

    let summary: Value = client
        .get(format!("http://{addr}/v1/metrics/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["by_provider"]["primary"], 1);

    let metrics = client
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("provider_requests_total"));

    let health = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let health: Value = health.json().await.unwrap();
    assert_eq!(health["status"]["status"], "up");
    assert_eq!(
        health["providers"][TEST_SOURCE]["primary"]["status"]["status"],
        "up"
    );
}
