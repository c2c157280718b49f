// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Rate-limit benchmarking
//!
//! Probes a provider at increasing request rates with single unthrottled attempts,
//! stops at the first 429 and recommends a limit below the fastest clean rate.

use std::time::Duration;

use http_client::{HttpClient, HttpError, RequestOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::RateLimitConfig;
use tokio::time::sleep;
use tracing::{info, warn};

/// How to probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkOptions {
    /// Rates to try, requests per second, in ascending order
    pub rates: Vec<f64>,
    /// Requests sent at each rate
    pub requests_per_rate: u32,
    /// Fraction of the fastest clean rate to recommend
    pub safety_factor: f64,
    /// Pause between rates so windows can drain
    pub pause: Duration,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            rates: vec![0.5, 1.0, 2.0, 5.0, 10.0],
            requests_per_rate: 5,
            safety_factor: 0.8,
            pause: Duration::from_secs(2),
        }
    }
}

/// Outcome at one rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkProbe {
    /// Requests per second attempted
    pub rate: f64,
    /// Requests sent before stopping
    pub sent: u32,
    /// 2xx responses
    pub succeeded: u32,
    /// Whether the provider answered 429
    pub rate_limited: bool,
}

/// Result of a benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Provider probed
    pub provider: String,
    /// One entry per rate tried
    pub probes: Vec<BenchmarkProbe>,
    /// Fastest rate that drew no 429
    pub max_clean_rate: Option<f64>,
    /// Suggested declaration
    pub recommended: RateLimitConfig,
}

/// Probe `endpoint` through `client` and recommend a limit
///
/// Window caps from `current` are carried over unchanged. When even the slowest rate
/// is throttled the recommendation is half the slowest rate times the safety factor.
///
/// # Errors
///
/// Returns [`HttpError::Configuration`] for empty or non-positive rates or a safety
/// factor outside `(0, 1]`.
pub async fn run_benchmark(
    client: &HttpClient,
    endpoint: &str,
    current: &RateLimitConfig,
    options: &BenchmarkOptions,
) -> Result<BenchmarkReport, HttpError> {
    validate(options)?;

    let mut probes = Vec::with_capacity(options.rates.len());
    let mut max_clean_rate = None;

    for (index, &rate) in options.rates.iter().enumerate() {
        if index > 0 && !options.pause.is_zero() {
            sleep(options.pause).await;
        }

        let probe = probe_rate(client, endpoint, rate, options.requests_per_rate).await;
        let throttled = probe.rate_limited;
        info!(
            provider = client.provider(),
            rate,
            sent = probe.sent,
            succeeded = probe.succeeded,
            rate_limited = throttled,
            "benchmark probe finished"
        );
        probes.push(probe);

        if throttled {
            break;
        }
        max_clean_rate = Some(rate);
    }

    let recommended_rate = match max_clean_rate {
        Some(rate) => rate * options.safety_factor,
        None => {
            warn!(provider = client.provider(), "throttled at the slowest benchmark rate");
            options.rates[0] * options.safety_factor / 2.0
        }
    };

    Ok(BenchmarkReport {
        provider: client.provider().to_string(),
        probes,
        max_clean_rate,
        recommended: recommend(current, recommended_rate),
    })
}

async fn probe_rate(
    client: &HttpClient,
    endpoint: &str,
    rate: f64,
    requests: u32,
) -> BenchmarkProbe {
    let spacing = Duration::from_secs_f64(1.0 / rate);
    let mut probe = BenchmarkProbe {
        rate,
        sent: 0,
        succeeded: 0,
        rate_limited: false,
    };

    for index in 0..requests {
        if index > 0 {
            sleep(spacing).await;
        }
        probe.sent += 1;
        match client
            .request_unthrottled::<Value>(endpoint, RequestOptions::get())
            .await
        {
            Ok(_) => probe.succeeded += 1,
            Err(HttpError::RateLimit { .. }) => {
                probe.rate_limited = true;
                break;
            }
            Err(_) => {}
        }
    }
    probe
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn recommend(current: &RateLimitConfig, requests_per_second: f64) -> RateLimitConfig {
    RateLimitConfig {
        requests_per_second,
        burst_limit: (requests_per_second.floor() as u32).max(1),
        requests_per_minute: current.requests_per_minute,
        requests_per_hour: current.requests_per_hour,
    }
}

fn validate(options: &BenchmarkOptions) -> Result<(), HttpError> {
    if options.rates.is_empty() {
        return Err(HttpError::configuration("benchmark needs at least one rate"));
    }
    if options.rates.iter().any(|rate| !rate.is_finite() || *rate <= 0.0) {
        return Err(HttpError::configuration("benchmark rates must be positive"));
    }
    if !(options.safety_factor > 0.0 && options.safety_factor <= 1.0) {
        return Err(HttpError::configuration(
            "safety_factor must be in (0, 1]",
        ));
    }
    if options.requests_per_rate == 0 {
        return Err(HttpError::configuration("requests_per_rate must be at least 1"));
    }
    Ok(())
}
