// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Live per-provider status for presentation layers
//!
//! The aggregator folds the provider event stream into a small alert map (active
//! rate-limit windows and open circuits) and combines it with recent request metrics
//! to produce display rows. It is a read-only projection: nothing here feeds back into
//! request routing.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_types::{ProviderEvent, ProviderStatus, RequestMetric};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_STATUS_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_ACTIVE_REQUESTS_PER_SECOND: f64 = 10.0;

/// Presentation heuristics for status rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusThresholds {
    /// Trailing window used for request rate and latency
    pub window: Duration,
    /// A provider above this rate is shown as active
    pub active_requests_per_second: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            window: DEFAULT_STATUS_WINDOW,
            active_requests_per_second: DEFAULT_ACTIVE_REQUESTS_PER_SECOND,
        }
    }
}

/// One display row per provider of a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRow {
    /// Provider name
    pub provider: String,
    /// Highest-priority status that currently applies
    pub status: ProviderStatus,
    /// Human-readable status, including the rate-limit countdown
    pub status_display: String,
    /// Requests per second over the status window
    pub requests_per_second: f64,
    /// Mean latency of successful requests in the window
    pub average_latency_ms: Option<f64>,
    /// All retained requests for this provider and source
    pub total_requests: u64,
    /// Time left in an active rate-limit window
    pub rate_limit_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct ProviderAlert {
    rate_limited_until: Option<DateTime<Utc>>,
    circuit_open_reason: Option<String>,
}

#[derive(Debug, Default)]
struct WindowStats {
    total: u64,
    in_window: u64,
    success_latency_sum: u64,
    success_count: u64,
}

/// Folds provider events and metrics into live status rows
#[derive(Debug, Default)]
pub struct ProviderStateAggregator {
    alerts: DashMap<(String, String), ProviderAlert>,
    thresholds: StatusThresholds,
}

impl ProviderStateAggregator {
    /// Create an aggregator with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an aggregator with custom thresholds
    pub fn with_thresholds(thresholds: StatusThresholds) -> Self {
        Self {
            alerts: DashMap::new(),
            thresholds,
        }
    }

    /// Thresholds in use
    pub fn thresholds(&self) -> StatusThresholds {
        self.thresholds
    }

    /// Apply one event to the alert map
    pub fn track_event(&self, event: &ProviderEvent) {
        match event {
            ProviderEvent::RateLimited {
                source,
                provider,
                retry_after_ms,
                timestamp,
            } => {
                let until = *timestamp + millis(*retry_after_ms);
                let mut alert = self.alert_mut(source, provider);
                if alert.rate_limited_until.is_none_or(|current| current < until) {
                    alert.rate_limited_until = Some(until);
                }
            }
            ProviderEvent::CircuitOpen {
                source,
                provider,
                reason,
                ..
            } => {
                self.alert_mut(source, provider).circuit_open_reason = Some(reason.clone());
            }
            ProviderEvent::RequestSucceeded {
                source, provider, ..
            } => {
                self.alerts.remove(&(source.clone(), provider.clone()));
            }
            ProviderEvent::Failover { .. } | ProviderEvent::RequestFailed { .. } => {}
        }
    }

    /// Compute status rows for one source
    ///
    /// Rows are sorted by request rate, highest first, with ties broken by provider
    /// name. Status priority is rate limited, then circuit open, then active, then
    /// idle.
    pub fn get_provider_rows(
        &self,
        metrics: &[Arc<RequestMetric>],
        service: &str,
        now: DateTime<Utc>,
    ) -> Vec<ProviderRow> {
        let window_start = now - chrono_duration(self.thresholds.window);

        let mut stats: BTreeMap<&str, WindowStats> = BTreeMap::new();
        for metric in metrics.iter().filter(|m| m.service == service) {
            let entry = stats.entry(metric.provider.as_str()).or_default();
            entry.total += 1;
            if metric.timestamp > window_start && metric.timestamp <= now {
                entry.in_window += 1;
                if metric.is_success() {
                    entry.success_count += 1;
                    entry.success_latency_sum += metric.duration_ms;
                }
            }
        }

        let window_secs = self.thresholds.window.as_secs_f64().max(f64::EPSILON);
        let mut rows: Vec<ProviderRow> = stats
            .into_iter()
            .map(|(provider, stats)| {
                #[allow(clippy::cast_precision_loss)]
                let requests_per_second = stats.in_window as f64 / window_secs;
                #[allow(clippy::cast_precision_loss)]
                let average_latency_ms = (stats.success_count > 0)
                    .then(|| stats.success_latency_sum as f64 / stats.success_count as f64);
                self.build_row(
                    service,
                    provider,
                    requests_per_second,
                    average_latency_ms,
                    stats.total,
                    now,
                )
            })
            .collect();

        rows.sort_by(|a, b| {
            b.requests_per_second
                .total_cmp(&a.requests_per_second)
                .then_with(|| a.provider.cmp(&b.provider))
        });
        rows
    }

    /// Consume an event stream on a background task
    ///
    /// The task ends when the bus is dropped or `shutdown` is cancelled.
    pub fn spawn(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ProviderEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("provider state aggregator stopping on shutdown");
                        break;
                    }
                    received = events.recv() => match received {
                        Ok(event) => self.track_event(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "provider state aggregator lagged behind event bus");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    fn build_row(
        &self,
        service: &str,
        provider: &str,
        requests_per_second: f64,
        average_latency_ms: Option<f64>,
        total_requests: u64,
        now: DateTime<Utc>,
    ) -> ProviderRow {
        let alert = self
            .alerts
            .get(&(service.to_string(), provider.to_string()))
            .map(|alert| alert.clone())
            .unwrap_or_default();

        let rate_limit_remaining_ms = alert
            .rate_limited_until
            .filter(|until| *until > now)
            .map(|until| u64::try_from((until - now).num_milliseconds()).unwrap_or(0));

        let (status, status_display) = if let Some(remaining_ms) = rate_limit_remaining_ms {
            (
                ProviderStatus::RateLimited,
                format!("rate limited ({}s)", remaining_ms.div_ceil(1000)),
            )
        } else if let Some(reason) = alert.circuit_open_reason {
            (ProviderStatus::CircuitOpen, format!("circuit open: {reason}"))
        } else if requests_per_second > self.thresholds.active_requests_per_second {
            (
                ProviderStatus::Active,
                format!("active ({requests_per_second:.1} req/s)"),
            )
        } else {
            (ProviderStatus::Idle, "idle".to_string())
        };

        ProviderRow {
            provider: provider.to_string(),
            status,
            status_display,
            requests_per_second,
            average_latency_ms,
            total_requests,
            rate_limit_remaining_ms,
        }
    }

    fn alert_mut(
        &self,
        source: &str,
        provider: &str,
    ) -> dashmap::mapref::one::RefMut<'_, (String, String), ProviderAlert> {
        self.alerts
            .entry((source.to_string(), provider.to_string()))
            .or_default()
    }
}

fn millis(ms: u64) -> TimeDelta {
    TimeDelta::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

fn chrono_duration(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
