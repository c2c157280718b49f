// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff policies and rate-limit header parsing

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE: Duration = Duration::from_millis(1000);
const DEFAULT_RATE_LIMIT_MAX: Duration = Duration::from_secs(60);
const DEFAULT_SERVER_ERROR_MAX: Duration = Duration::from_secs(10);

// Reset headers above this are absolute epoch seconds rather than deltas.
const EPOCH_RESET_THRESHOLD: u64 = 1_000_000_000;

const RESET_HEADERS: [&str; 2] = ["x-ratelimit-reset", "ratelimit-reset"];

/// Doubling delay `base * 2^(attempt - 1)`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay after the first failed attempt
    pub base: Duration,
    /// Upper bound for any delay
    pub max: Duration,
}

impl Backoff {
    /// Create a backoff policy
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay after the given 1-based attempt failed
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_from(self.base, attempt)
    }

    /// Same doubling and cap, starting from a server-provided base
    pub fn delay_from(&self, base: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        base.saturating_mul(1_u32 << exponent).min(self.max)
    }
}

/// Backoff policies per failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Used after HTTP 429, seeded from the response headers
    pub rate_limit: Backoff,
    /// Used after 5xx responses, timeouts and transport errors
    pub server_error: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit: Backoff::new(DEFAULT_BASE, DEFAULT_RATE_LIMIT_MAX),
            server_error: Backoff::new(DEFAULT_BASE, DEFAULT_SERVER_ERROR_MAX),
        }
    }
}

impl RetryPolicy {
    /// Base delay for a 429 response
    ///
    /// `Retry-After` (delta seconds or HTTP date) wins, then `X-RateLimit-Reset` or
    /// `RateLimit-Reset` (delta or epoch seconds), then the policy's own base.
    pub fn rate_limit_base(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
        retry_after(headers, now)
            .or_else(|| rate_limit_reset(headers, now))
            .unwrap_or(self.rate_limit.base)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = header_str(headers, RETRY_AFTER.as_str())?;
    if let Ok(seconds) = value.parse::<u64>() {
        return non_zero(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    non_zero((at - now).to_std().ok()?)
}

fn rate_limit_reset(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    RESET_HEADERS.iter().find_map(|name| {
        let value = header_str(headers, name)?.parse::<u64>().ok()?;
        let delay = if value > EPOCH_RESET_THRESHOLD {
            let now_secs = u64::try_from(now.timestamp()).ok()?;
            Duration::from_secs(value.checked_sub(now_secs)?)
        } else {
            Duration::from_secs(value)
        };
        non_zero(delay)
    })
}

fn non_zero(delay: Duration) -> Option<Duration> {
    (!delay.is_zero()).then_some(delay)
}
