// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Health check types for provider probes

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::HttpError;

/// Health of one provider as seen by its last probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum HealthStatus {
    /// Probe succeeded and the validator accepted the body
    Up,
    /// Reachable but throttled or slow
    Degraded { reason: String },
    /// Probe failed
    Down { reason: String },
}

impl HealthStatus {
    /// Check if this health status indicates the provider is usable
    pub fn is_available(&self) -> bool {
        matches!(self, HealthStatus::Up | HealthStatus::Degraded { .. })
    }

    /// Check if this health status indicates the provider is down
    pub fn is_down(&self) -> bool {
        matches!(self, HealthStatus::Down { .. })
    }

    /// Get a human-readable description of the status
    pub fn description(&self) -> &str {
        match self {
            HealthStatus::Up => "Provider is healthy",
            HealthStatus::Degraded { reason } | HealthStatus::Down { reason } => reason,
        }
    }

    /// Map a failed probe to a status
    ///
    /// A rate-limited provider answered, so it counts as degraded rather than down.
    pub fn from_error(error: &HttpError) -> Self {
        match error {
            HttpError::RateLimit { .. } => HealthStatus::Degraded {
                reason: error.to_string(),
            },
            _ => HealthStatus::Down {
                reason: error.to_string(),
            },
        }
    }
}

/// Probe outcome with timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// The health status
    pub status: HealthStatus,
    /// Probe round trip in milliseconds
    pub response_time_ms: u64,
    /// When the probe finished
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Build a result from a probe outcome
    pub fn from_probe(outcome: Result<(), &HttpError>, response_time: Duration) -> Self {
        let status = match outcome {
            Ok(()) => HealthStatus::Up,
            Err(error) => HealthStatus::from_error(error),
        };
        Self {
            status,
            response_time_ms: u64::try_from(response_time.as_millis()).unwrap_or(u64::MAX),
            timestamp: Utc::now(),
        }
    }
}
