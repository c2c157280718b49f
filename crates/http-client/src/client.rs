// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Rate-limited, retrying HTTP client for one provider
//!
//! Each [`HttpClient`] owns the throttle state of exactly one provider endpoint.
//! Every physical attempt is gated by the limiter, timed, recorded as a
//! [`RequestMetric`] and classified into an [`HttpError`] when it fails. Retryable
//! failures back off exponentially; a 429 seeds its backoff from the provider's
//! rate-limit headers and is broadcast as a [`ProviderEvent::RateLimited`].

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use chrono::Utc;
use instrumentation::{EventBus, InstrumentationCollector, sanitize_endpoint};
use reqwest::{Client, Method, StatusCode, header::HeaderMap};
use serde::{Serialize, de::DeserializeOwned};
use shared_types::{HttpMethod, ProviderEvent, RateLimitConfig, RequestMetric};
use tokio::{
    sync::Mutex,
    time::{Instant, sleep, timeout, timeout_at},
};
use tracing::{Instrument, debug, debug_span, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    HttpError, NoopHooks, RequestContext, RequestHooks, ResponseSchema, RetryPolicy,
    rate_limit::{self, RateLimitState},
    schema::ValidationIssue,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(300);
const MAX_ERROR_BODY_CHARS: usize = 200;
const USER_AGENT: &str = concat!("provider-resilience/", env!("CARGO_PKG_VERSION"));

/// Where an API key is attached to outgoing requests
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ApiKeyPlacement {
    /// Sent as a request header
    Header { name: String },
    /// Sent as a query parameter
    Query { name: String },
}

/// Opaque provider credential
///
/// The value is forwarded verbatim and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential {
    placement: ApiKeyPlacement,
    value: String,
}

impl ApiCredential {
    /// Credential sent as header `name`
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            placement: ApiKeyPlacement::Header { name: name.into() },
            value: value.into(),
        }
    }

    /// Credential sent as query parameter `name`
    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            placement: ApiKeyPlacement::Query { name: name.into() },
            value: value.into(),
        }
    }

    /// Where the credential goes
    pub fn placement(&self) -> &ApiKeyPlacement {
        &self.placement
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("placement", &self.placement)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Static configuration of one provider client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Provider name used in metrics, events and logs
    pub provider: String,
    /// Logical source the provider serves
    pub service: String,
    /// Prefix for relative endpoints
    pub base_url: Url,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// Optional API key
    pub credential: Option<ApiCredential>,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Total attempts per request, at least one
    pub max_retries: u32,
    /// Declared provider limits
    pub rate_limit: RateLimitConfig,
    /// Backoff policies
    pub retry: RetryPolicy,
    /// Longest the client waits for rate-limit permission
    pub max_rate_limit_wait: Duration,
}

impl HttpClientConfig {
    /// Configuration with defaults for everything but identity and base URL
    pub fn new(
        provider: impl Into<String>,
        service: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, HttpError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| HttpError::configuration(format!("invalid base URL: {error}")))?;
        Ok(Self {
            provider: provider.into(),
            service: service.into(),
            base_url,
            default_headers: BTreeMap::new(),
            credential: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            max_rate_limit_wait: DEFAULT_MAX_RATE_LIMIT_WAIT,
        })
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set total attempts per request
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the declared rate limit
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the backoff policies
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach an API key
    #[must_use]
    pub fn with_credential(mut self, credential: ApiCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Add a header sent with every request
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Bound the rate-limit wait
    #[must_use]
    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }
}

/// Per-request options
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// HTTP method
    pub method: HttpMethod,
    /// Query parameters appended to the endpoint
    pub query: Vec<(String, String)>,
    /// Extra headers for this request
    pub headers: BTreeMap<String, String>,
    /// JSON body
    pub body: Option<serde_json::Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    /// Plain GET
    pub fn get() -> Self {
        Self {
            method: HttpMethod::Get,
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// POST with a JSON body
    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get()
        }
    }

    /// Append a query parameter
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

struct AttemptFailure {
    error: HttpError,
    backoff: Duration,
}

/// How a request is gated and repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// Limiter-gated, up to `max_retries` attempts
    Retrying,
    /// Limiter-gated, one attempt, short token wait
    Once,
    /// One attempt outside the limiter
    Unthrottled,
}

/// HTTP client bound to one provider
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    limiter: Mutex<RateLimitState>,
    collector: Arc<InstrumentationCollector>,
    events: Option<EventBus>,
    hooks: Arc<dyn RequestHooks>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("provider", &self.config.provider)
            .field("service", &self.config.service)
            .field("base_url", &self.config.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client recording into `collector`
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Configuration`] for an invalid rate limit or when the
    /// underlying HTTP client cannot be built.
    pub fn new(
        config: HttpClientConfig,
        collector: Arc<InstrumentationCollector>,
    ) -> Result<Self, HttpError> {
        config
            .rate_limit
            .validate()
            .map_err(|error| HttpError::configuration(error.to_string()))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| HttpError::configuration(error.without_url().to_string()))?;

        let limiter = Mutex::new(RateLimitState::new(&config.rate_limit, Utc::now()));

        Ok(Self {
            client,
            config,
            limiter,
            collector,
            events: None,
            hooks: Arc::new(NoopHooks),
        })
    }

    /// Publish rate-limit events on `events`
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Install per-attempt hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn RequestHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Provider name
    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// Copy of the current throttle state
    pub async fn rate_limit_snapshot(&self) -> RateLimitState {
        self.limiter.lock().await.clone()
    }

    /// Send a request and decode the JSON response
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        self.execute(endpoint, &options, None, Dispatch::Retrying)
            .await
    }

    /// Send a request, decode and validate the JSON response
    pub async fn request_with_schema<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
        schema: &ResponseSchema<T>,
    ) -> Result<T, HttpError> {
        self.execute(endpoint, &options, Some(schema), Dispatch::Retrying)
            .await
    }

    /// Single limiter-gated attempt
    ///
    /// Waits at most the request timeout for a token, so a saturated limiter fails
    /// fast with [`HttpError::RateLimit`] instead of queueing behind real traffic.
    pub async fn request_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        self.execute(endpoint, &options, None, Dispatch::Once).await
    }

    /// Single attempt that bypasses the limiter and retries
    pub async fn request_unthrottled<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        self.execute(endpoint, &options, None, Dispatch::Unthrottled)
            .await
    }

    /// GET and decode
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, HttpError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    /// GET, decode and validate
    pub async fn get_with_schema<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        schema: &ResponseSchema<T>,
    ) -> Result<T, HttpError> {
        self.request_with_schema(endpoint, RequestOptions::get(), schema)
            .await
    }

    /// POST a JSON body and decode
    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(endpoint, RequestOptions::post(to_json(body)?))
            .await
    }

    /// POST a JSON body, decode and validate
    pub async fn post_with_schema<T, B>(
        &self,
        endpoint: &str,
        body: &B,
        schema: &ResponseSchema<T>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_with_schema(endpoint, RequestOptions::post(to_json(body)?), schema)
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        schema: Option<&ResponseSchema<T>>,
        dispatch: Dispatch,
    ) -> Result<T, HttpError> {
        let url = self.build_url(endpoint, &options.query)?;
        let sanitized = sanitize_endpoint(url.as_str());
        let request_id = Uuid::new_v4();
        let (attempts, max_wait) = match dispatch {
            Dispatch::Retrying => (
                self.config.max_retries.max(1),
                Some(self.config.max_rate_limit_wait),
            ),
            Dispatch::Once => (
                1,
                Some(self.config.max_rate_limit_wait.min(self.config.timeout)),
            ),
            Dispatch::Unthrottled => (1, None),
        };

        let span = debug_span!(
            "provider_request",
            %request_id,
            provider = %self.config.provider,
            service = %self.config.service,
            endpoint = %sanitized,
        );

        async {
            let mut context = RequestContext {
                request_id,
                provider: self.config.provider.clone(),
                service: self.config.service.clone(),
                endpoint: sanitized.clone(),
                method: options.method,
                attempt: 1,
            };

            loop {
                if let Some(max_wait) = max_wait {
                    self.wait_for_rate_limit(max_wait).await?;
                }
                self.hooks.on_request_start(&context);
                debug!(attempt = context.attempt, "sending provider request");

                let failure = match self.attempt(&url, options, schema, &context).await {
                    Ok(value) => return Ok(value),
                    Err(failure) => failure,
                };
                self.hooks.on_request_failure(&context, &failure.error);

                if !failure.error.is_retryable() || context.attempt >= attempts {
                    debug!(
                        attempt = context.attempt,
                        code = failure.error.code(),
                        "provider request failed"
                    );
                    return Err(failure.error);
                }

                warn!(
                    attempt = context.attempt,
                    delay_ms = millis(failure.backoff),
                    error = %failure.error,
                    "retrying provider request"
                );
                self.hooks
                    .on_backoff(&context, failure.backoff, &failure.error);
                sleep(failure.backoff).await;
                context.attempt += 1;
            }
        }
        .instrument(span)
        .await
    }

    /// Block until the limiter admits one request
    ///
    /// The limiter lock is held while sleeping so waiters are admitted in arrival
    /// order, and it is released before this returns.
    async fn wait_for_rate_limit(&self, max_wait: Duration) -> Result<(), HttpError> {
        let deadline = Instant::now() + max_wait;
        let exceeded = || HttpError::RateLimit {
            retry_after_ms: millis(max_wait),
        };

        let mut limiter = timeout_at(deadline, self.limiter.lock())
            .await
            .map_err(|_| exceeded())?;

        loop {
            let acquired =
                rate_limit::try_acquire(&mut limiter, &self.config.rate_limit, Utc::now());
            let wait = match acquired {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            if Instant::now() + wait > deadline {
                warn!(
                    wait_ms = millis(wait),
                    "rate limit wait would exceed deadline"
                );
                return Err(HttpError::RateLimit {
                    retry_after_ms: millis(wait),
                });
            }
            debug!(wait_ms = millis(wait), "waiting for rate limit");
            sleep(wait).await;
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &Url,
        options: &RequestOptions,
        schema: Option<&ResponseSchema<T>>,
        context: &RequestContext,
    ) -> Result<T, AttemptFailure> {
        let started = Instant::now();
        let sent = timeout(self.config.timeout, self.send(url, options)).await;
        let elapsed = started.elapsed();
        let server_backoff = self.config.retry.server_error.delay(context.attempt);

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                let error = if error.is_timeout() {
                    HttpError::Timeout {
                        timeout_ms: millis(self.config.timeout),
                    }
                } else {
                    HttpError::network(error.without_url().to_string())
                };
                return Err(self.fail(context, 0, elapsed, error, server_backoff));
            }
            Err(_) => {
                let error = HttpError::Timeout {
                    timeout_ms: millis(self.config.timeout),
                };
                return Err(self.fail(context, 0, elapsed, error, server_backoff));
            }
        };

        let status = response.status.as_u16();

        if response.status.is_success() {
            return match decode(&response.body, schema) {
                Ok(value) => {
                    let metric = self.record(context, status, elapsed, None);
                    self.hooks.on_request_success(context, &metric);
                    debug!(status, duration_ms = metric.duration_ms, "provider request succeeded");
                    Ok(value)
                }
                Err(error) => Err(self.fail(context, status, elapsed, error, Duration::ZERO)),
            };
        }

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let base = self
                .config
                .retry
                .rate_limit_base(&response.headers, Utc::now());
            let delay = self.config.retry.rate_limit.delay_from(base, context.attempt);
            let retry_after_ms = millis(delay);
            self.publish_rate_limited(retry_after_ms);
            self.hooks.on_rate_limited(context, retry_after_ms);
            let error = HttpError::RateLimit { retry_after_ms };
            return Err(self.fail(context, status, elapsed, error, delay));
        }

        let message = error_message(response.status, &response.body);
        if response.status.is_server_error() {
            let error = HttpError::Service { status, message };
            Err(self.fail(context, status, elapsed, error, server_backoff))
        } else {
            let error = HttpError::Http { status, message };
            Err(self.fail(context, status, elapsed, error, Duration::ZERO))
        }
    }

    async fn send(
        &self,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<RawResponse, reqwest::Error> {
        let method = match options.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut request = self
            .client
            .request(method, url.clone())
            .header("accept", "application/json");

        for (name, value) in self.config.default_headers.iter().chain(&options.headers) {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(credential) = &self.config.credential {
            request = match &credential.placement {
                ApiKeyPlacement::Header { name } => {
                    request.header(name.as_str(), credential.value.as_str())
                }
                ApiKeyPlacement::Query { name } => {
                    request.query(&[(name.as_str(), credential.value.as_str())])
                }
            };
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn fail(
        &self,
        context: &RequestContext,
        status: u16,
        elapsed: Duration,
        error: HttpError,
        backoff: Duration,
    ) -> AttemptFailure {
        self.record(context, status, elapsed, Some(&error));
        AttemptFailure { error, backoff }
    }

    fn record(
        &self,
        context: &RequestContext,
        status: u16,
        elapsed: Duration,
        error: Option<&HttpError>,
    ) -> Arc<RequestMetric> {
        self.collector.record(RequestMetric {
            provider: self.config.provider.clone(),
            service: self.config.service.clone(),
            endpoint: context.endpoint.clone(),
            method: context.method,
            status,
            duration_ms: millis(elapsed),
            timestamp: Utc::now(),
            error: error.map(ToString::to_string),
        })
    }

    fn publish_rate_limited(&self, retry_after_ms: u64) {
        if let Some(events) = &self.events {
            events.publish(ProviderEvent::RateLimited {
                source: self.config.service.clone(),
                provider: self.config.provider.clone(),
                retry_after_ms,
                timestamp: Utc::now(),
            });
        }
    }

    fn build_url(&self, endpoint: &str, query: &[(String, String)]) -> Result<Url, HttpError> {
        let raw = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.as_str().trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        };
        let mut url = Url::parse(&raw).map_err(|error| {
            HttpError::configuration(format!(
                "invalid endpoint {}: {error}",
                sanitize_endpoint(&raw)
            ))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }
}

fn decode<T: DeserializeOwned>(
    body: &[u8],
    schema: Option<&ResponseSchema<T>>,
) -> Result<T, HttpError> {
    let value: T = serde_json::from_slice(body).map_err(|error| HttpError::ResponseValidation {
        issues: vec![ValidationIssue::from_decode_error(&error)],
    })?;
    if let Some(schema) = schema {
        schema.validate(&value).map_err(|issues| {
            debug!(schema = schema.name(), issues = issues.len(), "response failed validation");
            HttpError::ResponseValidation { issues }
        })?;
    }
    Ok(value)
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        text.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, HttpError> {
    serde_json::to_value(body)
        .map_err(|error| HttpError::configuration(format!("request body is not JSON: {error}")))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, eq};
    use serde_json::{Value, json};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    use super::*;
    use crate::{Backoff, MockRequestHooks};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            rate_limit: Backoff::new(Duration::from_millis(5), Duration::from_millis(20)),
            server_error: Backoff::new(Duration::from_millis(5), Duration::from_millis(20)),
        }
    }

    fn client_for(server: &MockServer) -> (HttpClient, Arc<InstrumentationCollector>) {
        let collector = Arc::new(InstrumentationCollector::new());
        let config = HttpClientConfig::new("etherscan", "ethereum", &server.uri())
            .unwrap()
            .with_rate_limit(RateLimitConfig::per_second(1000.0, 100))
            .with_retry_policy(fast_retry());
        (
            HttpClient::new(config, Arc::clone(&collector)).unwrap(),
            collector,
        )
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = ApiCredential::query("apikey", "super-secret");
        let printed = format!("{credential:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("apikey"));
    }

    #[test]
    fn invalid_rate_limit_is_rejected() {
        let config = HttpClientConfig::new("p", "s", "https://example.com")
            .unwrap()
            .with_rate_limit(RateLimitConfig::per_second(0.0, 1));
        let error = HttpClient::new(config, Arc::new(InstrumentationCollector::new())).unwrap_err();
        assert_eq!(error.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(HttpClientConfig::new("p", "s", "not a url").is_err());
    }

    #[tokio::test]
    async fn relative_endpoints_join_the_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/api"))
            .and(query_param("module", "account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let collector = Arc::new(InstrumentationCollector::new());
        let base_url = format!("{}/v2/", server.uri());
        let config = HttpClientConfig::new("etherscan", "ethereum", &base_url).unwrap();
        let client = HttpClient::new(config, Arc::clone(&collector)).unwrap();

        let body: Value = client
            .request("/api", RequestOptions::get().with_query("module", "account"))
            .await
            .unwrap();
        assert_eq!(body["status"], "1");
        assert_eq!(collector.get_metrics()[0].endpoint, "/v2/api");
    }

    #[tokio::test]
    async fn credentials_are_attached_but_not_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("apikey", "0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d"))
            .and(header("x-client", "resilience"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let collector = Arc::new(InstrumentationCollector::new());
        let config = HttpClientConfig::new("etherscan", "ethereum", &server.uri())
            .unwrap()
            .with_header("x-client", "resilience")
            .with_credential(ApiCredential::query(
                "apikey",
                "0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d",
            ));
        let client = HttpClient::new(config, Arc::clone(&collector)).unwrap();

        let _: Value = client.get("/api").await.unwrap();
        let metric = &collector.get_metrics()[0];
        assert_eq!(metric.endpoint, "/api");
        assert!(metric.error.is_none());
    }

    #[tokio::test]
    async fn hooks_observe_retry_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let mut hooks = MockRequestHooks::new();
        hooks.expect_on_request_start().times(2).return_const(());
        hooks
            .expect_on_request_failure()
            .withf(|context, error| context.attempt == 1 && error.code() == "SERVICE_ERROR")
            .times(1)
            .return_const(());
        hooks
            .expect_on_backoff()
            .with(always(), eq(Duration::from_millis(5)), always())
            .times(1)
            .return_const(());
        hooks
            .expect_on_request_success()
            .withf(|context, metric| context.attempt == 2 && metric.status == 200)
            .times(1)
            .return_const(());

        let (client, collector) = client_for(&server);
        let client = client.with_hooks(Arc::new(hooks));

        let body: Value = client.get("/status").await.unwrap();
        assert_eq!(body["ok"], true);

        let statuses: Vec<_> = collector.get_metrics().iter().map(|m| m.status).collect();
        assert_eq!(statuses, vec![503, 200]);
    }

    #[tokio::test]
    async fn rate_limited_hook_gets_backoff_from_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("x-ratelimit-reset", "0"))
            .mount(&server)
            .await;

        let mut hooks = MockRequestHooks::new();
        hooks.expect_on_request_start().return_const(());
        hooks.expect_on_request_failure().return_const(());
        hooks.expect_on_backoff().return_const(());
        hooks
            .expect_on_rate_limited()
            .with(always(), eq(5_u64))
            .times(1)
            .return_const(());
        hooks
            .expect_on_rate_limited()
            .with(always(), eq(10_u64))
            .times(1)
            .return_const(());
        hooks
            .expect_on_rate_limited()
            .with(always(), eq(20_u64))
            .times(1)
            .return_const(());

        let (client, _) = client_for(&server);
        let client = client.with_hooks(Arc::new(hooks));
        assert_eq!(client.config().max_retries, 3);

        let error = client.get::<Value>("/limited").await.unwrap_err();
        assert_eq!(error, HttpError::RateLimit { retry_after_ms: 20 });
    }

    #[tokio::test]
    async fn snapshot_reflects_consumed_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let collector = Arc::new(InstrumentationCollector::new());
        let config = HttpClientConfig::new("routescan", "ethereum", &server.uri())
            .unwrap()
            .with_rate_limit(RateLimitConfig::per_second(0.001, 5));
        let client = HttpClient::new(config, collector).unwrap();

        for _ in 0..3 {
            let _: Value = client.get("/x").await.unwrap();
        }
        let snapshot = client.rate_limit_snapshot().await;
        assert!(snapshot.tokens < 2.1 && snapshot.tokens >= 2.0);
    }

    #[tokio::test]
    async fn single_attempt_is_gated_and_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let collector = Arc::new(InstrumentationCollector::new());
        let config = HttpClientConfig::new("blockstream.info", "bitcoin", &server.uri())
            .unwrap()
            .with_timeout(Duration::from_millis(200))
            .with_rate_limit(RateLimitConfig::per_second(1.0, 1).with_per_minute(1));
        let client = HttpClient::new(config, collector).unwrap();

        let first: Value = client
            .request_once("/status", RequestOptions::get())
            .await
            .unwrap();
        assert_eq!(first["ok"], true);

        let started = std::time::Instant::now();
        for _ in 0..4 {
            let error = client
                .request_once::<Value>("/status", RequestOptions::get())
                .await
                .unwrap_err();
            assert_eq!(error.code(), "RATE_LIMIT");
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
