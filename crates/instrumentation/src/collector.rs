// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Append-only request metrics sink
//!
//! Every provider HTTP client records one [`RequestMetric`] per physical attempt.
//! Records are immutable once recorded and are handed out as shared `Arc`s, so a
//! snapshot returned by [`InstrumentationCollector::get_metrics`] always contains the
//! very same records that were recorded.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use shared_types::RequestMetric;
use tracing::trace;

use crate::exporter;

/// Aggregate view over a set of request metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Number of attempts
    pub total: u64,
    /// Mean attempt duration in milliseconds, `0.0` when empty
    pub avg_duration_ms: f64,
    /// Attempts per provider
    pub by_provider: BTreeMap<String, u64>,
    /// Attempts per logical source
    pub by_service: BTreeMap<String, u64>,
    /// Attempts per `"{provider}:{endpoint}"`
    pub by_endpoint: BTreeMap<String, u64>,
}

impl MetricsSummary {
    /// Summarize metrics in a single pass
    pub fn from_metrics<'a, I>(metrics: I) -> Self
    where
        I: IntoIterator<Item = &'a RequestMetric>,
    {
        let (mut summary, total_duration_ms) = metrics.into_iter().fold(
            (Self::default(), 0u128),
            |(mut summary, duration), metric| {
                summary.total += 1;
                *summary
                    .by_provider
                    .entry(metric.provider.clone())
                    .or_insert(0) += 1;
                *summary
                    .by_service
                    .entry(metric.service.clone())
                    .or_insert(0) += 1;
                *summary
                    .by_endpoint
                    .entry(format!("{}:{}", metric.provider, metric.endpoint))
                    .or_insert(0) += 1;
                (summary, duration + u128::from(metric.duration_ms))
            },
        );

        if summary.total > 0 {
            #[allow(clippy::cast_precision_loss)]
            let average = total_duration_ms as f64 / summary.total as f64;
            summary.avg_duration_ms = average;
        }

        summary
    }
}

/// Process-wide sink for request metrics
///
/// Unbounded by default; [`InstrumentationCollector::with_capacity`] turns it into a
/// ring buffer that keeps only the newest records.
#[derive(Debug, Default)]
pub struct InstrumentationCollector {
    metrics: Mutex<VecDeque<Arc<RequestMetric>>>,
    capacity: Option<usize>,
}

impl InstrumentationCollector {
    /// Create an unbounded collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ring-bounded collector keeping at most `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            metrics: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: Some(capacity),
        }
    }

    /// Build from an optional capacity, `None` meaning unbounded
    pub fn from_capacity(capacity: Option<usize>) -> Self {
        capacity.map_or_else(Self::new, Self::with_capacity)
    }

    /// Append a metric and return the shared record
    pub fn record(&self, metric: RequestMetric) -> Arc<RequestMetric> {
        exporter::observe_request(&metric);

        let metric = Arc::new(metric);
        let mut metrics = self.lock();
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return metric;
            }
            while metrics.len() >= capacity {
                metrics.pop_front();
            }
        }
        metrics.push_back(Arc::clone(&metric));

        trace!(
            provider = %metric.provider,
            service = %metric.service,
            endpoint = %metric.endpoint,
            status = metric.status,
            duration_ms = metric.duration_ms,
            "recorded request metric"
        );

        metric
    }

    /// Snapshot of every retained record, oldest first
    pub fn get_metrics(&self) -> Vec<Arc<RequestMetric>> {
        self.lock().iter().cloned().collect()
    }

    /// Summary over every retained record
    pub fn get_summary(&self) -> MetricsSummary {
        let metrics = self.lock();
        MetricsSummary::from_metrics(metrics.iter().map(AsRef::as_ref))
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no records are retained
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all retained records
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<RequestMetric>>> {
        // Records are never left half-written, so a poisoned lock is still consistent.
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
