// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Declared provider rate limits

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rate limits a provider declares, enforced client side before each request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained token refill rate
    pub requests_per_second: f64,
    /// Token bucket capacity
    pub burst_limit: u32,
    /// Sliding window cap over the last minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
    /// Sliding window cap over the last hour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u32>,
}

/// Invalid rate limit declaration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateLimitConfigError {
    /// Refill rate must be a positive finite number
    #[error("requests_per_second must be positive and finite, got {0}")]
    InvalidRate(f64),
    /// Burst capacity must allow at least one request
    #[error("burst_limit must be at least 1")]
    ZeroBurst,
    /// Window caps must allow at least one request
    #[error("{window} cap must be at least 1")]
    ZeroWindowCap {
        /// Which window was misconfigured
        window: &'static str,
    },
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst_limit: 1,
            requests_per_minute: None,
            requests_per_hour: None,
        }
    }
}

impl RateLimitConfig {
    /// Create a limit with only a refill rate and burst capacity
    pub fn per_second(requests_per_second: f64, burst_limit: u32) -> Self {
        Self {
            requests_per_second,
            burst_limit,
            requests_per_minute: None,
            requests_per_hour: None,
        }
    }

    /// Add a per-minute sliding window cap
    #[must_use]
    pub fn with_per_minute(mut self, cap: u32) -> Self {
        self.requests_per_minute = Some(cap);
        self
    }

    /// Add a per-hour sliding window cap
    #[must_use]
    pub fn with_per_hour(mut self, cap: u32) -> Self {
        self.requests_per_hour = Some(cap);
        self
    }

    /// Check the declaration is usable by a token bucket
    pub fn validate(&self) -> Result<(), RateLimitConfigError> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(RateLimitConfigError::InvalidRate(self.requests_per_second));
        }
        if self.burst_limit == 0 {
            return Err(RateLimitConfigError::ZeroBurst);
        }
        if self.requests_per_minute == Some(0) {
            return Err(RateLimitConfigError::ZeroWindowCap { window: "per-minute" });
        }
        if self.requests_per_hour == Some(0) {
            return Err(RateLimitConfigError::ZeroWindowCap { window: "per-hour" });
        }
        Ok(())
    }
}
