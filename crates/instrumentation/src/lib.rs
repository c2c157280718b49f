// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Observability for the provider resilience layer
//!
//! Every physical HTTP attempt made by a provider client lands here as a
//! [`RequestMetric`](shared_types::RequestMetric), and every lifecycle change made by
//! the provider manager is broadcast as a [`ProviderEvent`](shared_types::ProviderEvent).
//!
//! # Components
//!
//! - [`collector::InstrumentationCollector`]: append-only metrics sink with summaries
//! - [`sanitize::sanitize_endpoint`]: strips query strings and secrets from endpoints
//! - [`events::EventBus`]: typed publish/subscribe channel for provider events
//! - [`aggregator::ProviderStateAggregator`]: live per-provider status rows
//! - [`exporter`]: Prometheus counters and histograms mirrored from the collector

pub mod aggregator;
pub mod collector;
pub mod error;
pub mod events;
pub mod exporter;
pub mod sanitize;

pub use aggregator::{ProviderRow, ProviderStateAggregator, StatusThresholds};
pub use collector::{InstrumentationCollector, MetricsSummary};
pub use error::{InstrumentationError, InstrumentationResult};
pub use events::EventBus;
pub use sanitize::sanitize_endpoint;
