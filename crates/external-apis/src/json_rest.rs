// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Config-driven JSON/REST provider
//!
//! Each supported operation maps to a [`RestRoute`] whose path and query values are
//! templates. `{address}` and `{since}` are filled from the [`Operation`]; any other
//! `{name}` is looked up in its params. A path placeholder without a value is an
//! error, a query pair without a value is left out.

use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    time::Instant,
};

use http_client::{
    ApiCredential, ApiKeyPlacement, HealthCheckResult, HttpClient, HttpClientConfig, HttpError,
    RequestOptions, ValidationIssue,
};
use serde_json::Value;
use shared_types::{HttpMethod, OperationKind};
use tracing::debug;
use url::form_urlencoded;

use crate::{
    BenchmarkOptions, BenchmarkReport, Operation, Provider, ProviderError, ProviderFuture,
    ProviderInit, ProviderMetadata, benchmark::run_benchmark,
};

/// Request template for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRoute {
    /// HTTP method
    pub method: HttpMethod,
    /// Path template relative to the base URL
    pub path: String,
    /// Query templates
    pub query: Vec<(String, String)>,
}

impl RestRoute {
    /// GET `path`
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// Add a query template
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Static description of a JSON/REST provider
#[derive(Debug, Clone)]
pub struct JsonRestSpec {
    /// Identity, limits and health check
    pub metadata: ProviderMetadata,
    /// Route per supported operation
    pub routes: BTreeMap<OperationKind, RestRoute>,
    /// Where the API key goes, when the provider takes one
    pub api_key: Option<ApiKeyPlacement>,
}

/// A provider whose operations are plain JSON GET/POST requests
#[derive(Debug)]
pub struct JsonRestProvider {
    metadata: ProviderMetadata,
    routes: BTreeMap<OperationKind, RestRoute>,
    client: HttpClient,
}

impl JsonRestProvider {
    /// Build a provider, applying configured overrides
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] when a required key is missing or
    /// the resulting client configuration is invalid.
    pub fn new(spec: JsonRestSpec, init: ProviderInit) -> Result<Self, ProviderError> {
        let JsonRestSpec {
            mut metadata,
            routes,
            api_key,
        } = spec;
        let settings = init.settings;

        if metadata.requires_api_key && init.api_key.is_none() {
            let hint = metadata
                .api_key_env
                .as_deref()
                .map(|var| format!(" (set {var})"))
                .unwrap_or_default();
            return Err(ProviderError::configuration(format!(
                "{} requires an API key{hint}",
                metadata.name
            )));
        }

        if let Some(base_url) = settings.base_url {
            metadata.base_url = base_url;
        }
        if let Some(rate_limit) = settings.rate_limit {
            metadata.rate_limit = rate_limit;
        }
        metadata.capabilities = routes.keys().copied().collect();

        let mut config =
            HttpClientConfig::new(&metadata.name, &metadata.source, &metadata.base_url)?
                .with_rate_limit(metadata.rate_limit.clone());
        if let Some(timeout) = settings.timeout_ms {
            config = config.with_timeout(timeout.as_duration());
        }
        if let Some(max_retries) = settings.max_retries {
            config = config.with_max_retries(max_retries);
        }
        if let (Some(placement), Some(key)) = (api_key, init.api_key) {
            config = config.with_credential(match placement {
                ApiKeyPlacement::Header { name } => ApiCredential::header(name, key.as_str()),
                ApiKeyPlacement::Query { name } => ApiCredential::query(name, key.as_str()),
            });
        }

        let client = HttpClient::new(config, init.collector)?.with_events(init.events);
        Ok(Self {
            metadata,
            routes,
            client,
        })
    }

    /// The underlying client
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    fn prepare(&self, operation: &Operation) -> Result<(String, RequestOptions), HttpError> {
        let route = self.routes.get(&operation.kind).ok_or_else(|| {
            HttpError::configuration(format!(
                "{} does not support {}",
                self.metadata.name, operation.kind
            ))
        })?;

        let path = render(&route.path, operation, encode_path_value).map_err(|name| {
            HttpError::configuration(format!(
                "{} needs `{name}` for {}",
                self.metadata.name, operation.kind
            ))
        })?;

        let mut options = match route.method {
            HttpMethod::Get => RequestOptions::get(),
            HttpMethod::Post => RequestOptions::post(Value::Object(serde_json::Map::new())),
        };
        for (name, template) in &route.query {
            if let Ok(value) = render(template, operation, str::to_string) {
                options = options.with_query(name, value);
            }
        }
        Ok((path, options))
    }
}

impl Provider for JsonRestProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn execute<'a>(&'a self, operation: &'a Operation) -> ProviderFuture<'a, Value> {
        Box::pin(async move {
            let (endpoint, options) = self.prepare(operation)?;
            debug!(
                provider = %self.metadata.name,
                operation = %operation.kind,
                "executing provider operation"
            );
            self.client.request::<Value>(&endpoint, options).await
        })
    }

    fn is_healthy(&self) -> Pin<Box<dyn Future<Output = HealthCheckResult> + Send + '_>> {
        Box::pin(async move {
            let check = &self.metadata.health_check;
            let started = Instant::now();
            let outcome = self
                .client
                .request_once::<Value>(&check.endpoint, RequestOptions::get())
                .await
                .and_then(|body| {
                    if (check.validator)(&body) {
                        Ok(())
                    } else {
                        Err(HttpError::ResponseValidation {
                            issues: vec![ValidationIssue::new(
                                "$",
                                "health check validator rejected the response",
                            )],
                        })
                    }
                });
            HealthCheckResult::from_probe(outcome.as_ref().copied(), started.elapsed())
        })
    }

    fn benchmark_rate_limit<'a>(
        &'a self,
        options: &'a BenchmarkOptions,
    ) -> ProviderFuture<'a, BenchmarkReport> {
        Box::pin(run_benchmark(
            &self.client,
            &self.metadata.health_check.endpoint,
            &self.metadata.rate_limit,
            options,
        ))
    }
}

/// Fill `{name}` placeholders; `Err` carries the first name without a value
fn render(
    template: &str,
    operation: &Operation,
    encode: impl Fn(&str) -> String,
) -> Result<String, String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
            break;
        };
        rendered.push_str(&rest[..open]);
        let name = &rest[open + 1..close];
        let value = match name {
            "address" => operation.address.clone(),
            "since" => operation.since.map(|since| since.to_string()),
            _ => operation.params.get(name).cloned(),
        }
        .ok_or_else(|| name.to_string())?;
        rendered.push_str(&encode(&value));
        rest = &rest[close + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

fn encode_path_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_operation_fields() {
        let op = Operation::for_address(OperationKind::GetAddressTransactions, "bc1q xyz")
            .since(1_700_000_000)
            .with_param("page", "2");

        assert_eq!(
            render("/address/{address}/txs", &op, encode_path_value).unwrap(),
            "/address/bc1q+xyz/txs"
        );
        assert_eq!(
            render("{since}-{page}", &op, str::to_string).unwrap(),
            "1700000000-2"
        );
        assert_eq!(render("/plain", &op, str::to_string).unwrap(), "/plain");
    }

    #[test]
    fn render_reports_missing_values() {
        let op = Operation::new(OperationKind::GetTransaction);
        assert_eq!(
            render("/tx/{address}", &op, encode_path_value),
            Err("address".to_string())
        );
        assert_eq!(render("{since}", &op, str::to_string), Err("since".to_string()));
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        let op = Operation::new(OperationKind::GetTransaction);
        assert_eq!(render("/a/{oops", &op, str::to_string).unwrap(), "/a/{oops");
    }
}
