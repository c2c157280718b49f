// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Token bucket plus sliding window throttle
//!
//! All functions here are deterministic transitions over [`RateLimitState`] given an
//! explicit `now`. The owning [`HttpClient`](crate::HttpClient) serializes access and
//! does the sleeping.

use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use shared_types::RateLimitConfig;

const MINUTE: TimeDelta = TimeDelta::minutes(1);
const HOUR: TimeDelta = TimeDelta::hours(1);
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Throttle state for one provider client
///
/// `0 <= tokens <= burst_limit` holds after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitState {
    /// Tokens currently available
    pub tokens: f64,
    /// Last time tokens were refilled
    pub last_refill_at: DateTime<Utc>,
    /// Admission times still inside the largest configured window, oldest first
    pub request_timestamps: VecDeque<DateTime<Utc>>,
}

impl RateLimitState {
    /// Full bucket, empty history
    pub fn new(config: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        Self {
            tokens: f64::from(config.burst_limit),
            last_refill_at: now,
            request_timestamps: VecDeque::new(),
        }
    }

    /// Admissions within the last minute
    pub fn requests_in_last_minute(&self, now: DateTime<Utc>) -> usize {
        count_in_window(&self.request_timestamps, now, MINUTE)
    }

    /// Admissions within the last hour
    pub fn requests_in_last_hour(&self, now: DateTime<Utc>) -> usize {
        count_in_window(&self.request_timestamps, now, HOUR)
    }
}

/// Add the tokens earned since the last refill, capped at the burst limit
///
/// A `now` earlier than `last_refill_at` refills nothing and leaves the refill
/// timestamp untouched.
pub fn refill_tokens(state: &mut RateLimitState, config: &RateLimitConfig, now: DateTime<Utc>) {
    if now <= state.last_refill_at {
        return;
    }
    let elapsed = (now - state.last_refill_at)
        .to_std()
        .unwrap_or_default()
        .as_secs_f64();
    let burst = f64::from(config.burst_limit);
    state.tokens = (state.tokens + elapsed * config.requests_per_second).min(burst);
    state.last_refill_at = now;
}

/// Drop admissions older than the largest configured window
pub fn clean_old_timestamps(
    timestamps: &mut VecDeque<DateTime<Utc>>,
    config: &RateLimitConfig,
    now: DateTime<Utc>,
) {
    let Some(window) = retention_window(config) else {
        timestamps.clear();
        return;
    };
    while timestamps
        .front()
        .is_some_and(|oldest| *oldest <= now - window)
    {
        timestamps.pop_front();
    }
}

/// Whether a token is available and no window cap is reached
pub fn should_allow_request(
    state: &RateLimitState,
    config: &RateLimitConfig,
    now: DateTime<Utc>,
) -> bool {
    state.tokens >= 1.0
        && under_cap(&state.request_timestamps, now, MINUTE, config.requests_per_minute)
        && under_cap(&state.request_timestamps, now, HOUR, config.requests_per_hour)
}

/// Spend one token and remember the admission
pub fn consume_token(state: &mut RateLimitState, config: &RateLimitConfig, now: DateTime<Utc>) {
    state.tokens = (state.tokens - 1.0).max(0.0);
    if retention_window(config).is_some() {
        state.request_timestamps.push_back(now);
    }
}

/// Time until the sooner blocker clears, never less than 1 ms
///
/// The token bucket blocks until one token has refilled; a full window blocks until
/// its oldest in-window admission expires. Callers re-check after waiting, so a
/// second blocker simply produces another wait.
pub fn calculate_wait_time(
    state: &RateLimitState,
    config: &RateLimitConfig,
    now: DateTime<Utc>,
) -> Duration {
    let token_wait = (state.tokens < 1.0).then(|| {
        let missing = 1.0 - state.tokens;
        Duration::from_secs_f64(missing / config.requests_per_second)
    });
    let timestamps = &state.request_timestamps;
    let minute_wait = window_wait(timestamps, now, MINUTE, config.requests_per_minute);
    let hour_wait = window_wait(timestamps, now, HOUR, config.requests_per_hour);

    [token_wait, minute_wait, hour_wait]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(MIN_WAIT)
        .max(MIN_WAIT)
}

/// Refill, clean and admit in one step
///
/// Returns the wait until the next check when the request is not admitted.
pub fn try_acquire(
    state: &mut RateLimitState,
    config: &RateLimitConfig,
    now: DateTime<Utc>,
) -> Result<(), Duration> {
    refill_tokens(state, config, now);
    clean_old_timestamps(&mut state.request_timestamps, config, now);
    if should_allow_request(state, config, now) {
        consume_token(state, config, now);
        Ok(())
    } else {
        Err(calculate_wait_time(state, config, now))
    }
}

fn retention_window(config: &RateLimitConfig) -> Option<TimeDelta> {
    if config.requests_per_hour.is_some() {
        Some(HOUR)
    } else if config.requests_per_minute.is_some() {
        Some(MINUTE)
    } else {
        None
    }
}

fn in_window(
    timestamps: &VecDeque<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> impl Iterator<Item = &DateTime<Utc>> {
    let start = now - window;
    timestamps.iter().filter(move |at| **at > start)
}

fn count_in_window(
    timestamps: &VecDeque<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> usize {
    in_window(timestamps, now, window).count()
}

fn under_cap(
    timestamps: &VecDeque<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: TimeDelta,
    cap: Option<u32>,
) -> bool {
    cap.is_none_or(|cap| count_in_window(timestamps, now, window) < cap as usize)
}

fn window_wait(
    timestamps: &VecDeque<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: TimeDelta,
    cap: Option<u32>,
) -> Option<Duration> {
    if under_cap(timestamps, now, window, cap) {
        return None;
    }
    let oldest = in_window(timestamps, now, window).next()?;
    Some((*oldest + window - now).to_std().unwrap_or_default())
}
