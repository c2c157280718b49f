// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics module
//!
//! Mirrors collector records and provider events into the default Prometheus
//! registry so they can be scraped alongside the in-memory summaries.

use std::sync::LazyLock;

use prometheus::{
    Encoder, HistogramVec, IntCounterVec, TextEncoder, register_histogram_vec,
    register_int_counter_vec,
};
use shared_types::{ProviderEvent, RequestMetric};

use crate::error::InstrumentationResult;

/// Total provider HTTP attempts, labeled by provider, service and status class.
pub static PROVIDER_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "provider_requests_total",
        "Total number of provider HTTP attempts",
        &["provider", "service", "status_class"]
    )
    .expect("Failed to create provider_requests_total counter vec")
});

/// Histogram for provider HTTP attempt durations in seconds.
pub static PROVIDER_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "provider_request_duration_seconds",
        "Provider HTTP attempt durations in seconds",
        &["provider", "service"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to create provider request duration histogram")
});

/// Provider lifecycle events, labeled by provider and event kind.
pub static PROVIDER_EVENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "provider_events_total",
        "Total number of provider lifecycle events",
        &["provider", "kind"]
    )
    .expect("Failed to create provider_events_total counter vec")
});

/// Count and time one recorded attempt
pub fn observe_request(metric: &RequestMetric) {
    PROVIDER_REQUESTS
        .with_label_values(&[
            metric.provider.as_str(),
            metric.service.as_str(),
            metric.status_class(),
        ])
        .inc();

    #[allow(clippy::cast_precision_loss)]
    let duration_secs = metric.duration_ms as f64 / 1000.0;
    PROVIDER_REQUEST_DURATION
        .with_label_values(&[metric.provider.as_str(), metric.service.as_str()])
        .observe(duration_secs);
}

/// Count one provider event
pub fn record_event(event: &ProviderEvent) {
    PROVIDER_EVENTS
        .with_label_values(&[event.provider(), event.kind()])
        .inc();
}

/// Render the default registry in Prometheus text format
pub fn render() -> InstrumentationResult<(String, String)> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;

    Ok((encoder.format_type().to_string(), String::from_utf8(buffer)?))
}
