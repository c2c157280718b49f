// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Provider lifecycle events
//!
//! Events are produced by the HTTP client (rate limiting) and the provider manager
//! (circuit, failover and request outcomes), broadcast once, and consumed by any
//! number of subscribers such as the state aggregator or a log sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::OperationKind;

/// Tagged union of everything that happens to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderEvent {
    /// Provider answered 429; calls should pause for `retry_after_ms`
    #[serde(rename = "rate_limited")]
    RateLimited {
        /// Logical source
        source: String,
        /// Provider that was throttled
        provider: String,
        /// Server-advised wait before the next call
        retry_after_ms: u64,
        /// When the 429 was observed
        timestamp: DateTime<Utc>,
    },
    /// Circuit breaker for a provider tripped open
    #[serde(rename = "circuit_open")]
    CircuitOpen {
        /// Logical source
        source: String,
        /// Provider whose breaker opened
        provider: String,
        /// Last error that tripped the breaker
        reason: String,
        /// When the breaker opened
        timestamp: DateTime<Utc>,
    },
    /// Manager moved from one candidate to the next
    #[serde(rename = "failover")]
    Failover {
        /// Logical source
        source: String,
        /// Provider that failed
        from: String,
        /// Provider tried next
        to: String,
        /// Why `from` was abandoned
        reason: String,
        /// When the switch happened
        timestamp: DateTime<Utc>,
    },
    /// Provider served an operation
    #[serde(rename = "request.succeeded")]
    RequestSucceeded {
        /// Logical source
        source: String,
        /// Provider that answered
        provider: String,
        /// Operation served
        operation: OperationKind,
        /// Time spent in the provider call, retries included
        duration_ms: u64,
        /// Completion time
        timestamp: DateTime<Utc>,
    },
    /// Provider failed an operation after its own retries
    #[serde(rename = "request.failed")]
    RequestFailed {
        /// Logical source
        source: String,
        /// Provider that failed
        provider: String,
        /// Operation attempted
        operation: OperationKind,
        /// Terminal error summary
        error: String,
        /// Failure time
        timestamp: DateTime<Utc>,
    },
}

impl ProviderEvent {
    /// The provider the event is about (`from` for failovers)
    pub fn provider(&self) -> &str {
        match self {
            Self::RateLimited { provider, .. }
            | Self::CircuitOpen { provider, .. }
            | Self::RequestSucceeded { provider, .. }
            | Self::RequestFailed { provider, .. } => provider,
            Self::Failover { from, .. } => from,
        }
    }

    /// The logical source the event belongs to
    pub fn source(&self) -> &str {
        match self {
            Self::RateLimited { source, .. }
            | Self::CircuitOpen { source, .. }
            | Self::Failover { source, .. }
            | Self::RequestSucceeded { source, .. }
            | Self::RequestFailed { source, .. } => source,
        }
    }

    /// When the event happened
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RateLimited { timestamp, .. }
            | Self::CircuitOpen { timestamp, .. }
            | Self::Failover { timestamp, .. }
            | Self::RequestSucceeded { timestamp, .. }
            | Self::RequestFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Wire tag of the event
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Failover { .. } => "failover",
            Self::RequestSucceeded { .. } => "request.succeeded",
            Self::RequestFailed { .. } => "request.failed",
        }
    }
}
