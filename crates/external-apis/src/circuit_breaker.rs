// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-provider circuit breaker
//!
//! A breaker opens after `failure_threshold` consecutive failures and refuses calls
//! until `cooldown` has elapsed. After the cooldown exactly one caller may claim a
//! half-open trial with [`CircuitBreakerState::try_acquire`]; everyone else stays
//! blocked until its outcome is recorded. Success closes the breaker, failure
//! reopens it and restarts the cooldown. A trial whose outcome never arrives is
//! reclaimable once another cooldown has passed.
//!
//! The state is plain data with time passed in explicitly; the
//! [`ProviderManager`](crate::ProviderManager) owns one per (source, provider).

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Effective breaker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    /// Calls flow normally
    Closed,
    /// Calls are refused until the cooldown elapses
    Open,
    /// Cooldown elapsed; one trial call is admitted
    HalfOpen,
}

impl CircuitStatus {
    /// Lowercase wire name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Breaker thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// How long an open breaker refuses calls
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Breaker state for one provider of one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Stored status; use [`status_at`](Self::status_at) for the effective one
    pub status: CircuitStatus,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// When the breaker last opened
    pub opened_at: Option<DateTime<Utc>>,
    /// When the in-flight half-open trial was claimed
    #[serde(default)]
    pub trial_started_at: Option<DateTime<Utc>>,
    /// Thresholds this breaker applies
    pub config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerState {
    /// A closed breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_started_at: None,
            config,
        }
    }

    /// Effective status at `now`
    ///
    /// An open breaker whose cooldown has elapsed reports [`CircuitStatus::HalfOpen`].
    pub fn status_at(&self, now: DateTime<Utc>) -> CircuitStatus {
        match self.status {
            CircuitStatus::Open if self.cooldown_elapsed(now) => CircuitStatus::HalfOpen,
            status => status,
        }
    }

    /// Whether a call at `now` would be admitted, without claiming anything
    pub fn can_attempt(&self, now: DateTime<Utc>) -> bool {
        match self.status_at(now) {
            CircuitStatus::Closed => true,
            CircuitStatus::Open => false,
            CircuitStatus::HalfOpen => !self.trial_in_flight(now),
        }
    }

    /// Admit one call at `now`
    ///
    /// Closed admits every call. Half-open admits the first caller and marks the
    /// trial as claimed; later callers are refused until
    /// [`record_success`](Self::record_success), [`record_failure`](Self::record_failure)
    /// or [`release_trial`](Self::release_trial).
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        match self.status_at(now) {
            CircuitStatus::Closed => true,
            CircuitStatus::Open => false,
            CircuitStatus::HalfOpen if self.trial_in_flight(now) => false,
            CircuitStatus::HalfOpen => {
                self.trial_started_at = Some(now);
                true
            }
        }
    }

    /// Give back a claimed trial without an outcome
    pub fn release_trial(&mut self) {
        self.trial_started_at = None;
    }

    /// Time left before an open breaker allows a trial call
    pub fn time_until_retry(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.status_at(now) != CircuitStatus::Open {
            return None;
        }
        let reopen_at = self.opened_at? + cooldown_delta(self.config.cooldown);
        (reopen_at - now).to_std().ok()
    }

    /// Count a failure
    ///
    /// Returns `true` when this failure moved the breaker to open, either by reaching
    /// the threshold or by failing the half-open trial.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        self.trial_started_at = None;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.status_at(now) {
            CircuitStatus::HalfOpen => {
                self.open(now);
                true
            }
            CircuitStatus::Closed if self.consecutive_failures >= self.config.failure_threshold => {
                self.open(now);
                true
            }
            CircuitStatus::Closed | CircuitStatus::Open => false,
        }
    }

    /// Count a success, closing the breaker
    pub fn record_success(&mut self) {
        self.status = CircuitStatus::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_started_at = None;
    }

    fn open(&mut self, now: DateTime<Utc>) {
        self.status = CircuitStatus::Open;
        self.opened_at = Some(now);
    }

    fn trial_in_flight(&self, now: DateTime<Utc>) -> bool {
        self.trial_started_at
            .is_some_and(|started| now - started < cooldown_delta(self.config.cooldown))
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.opened_at
            .is_none_or(|opened_at| now - opened_at >= cooldown_delta(self.config.cooldown))
    }
}

fn cooldown_delta(cooldown: Duration) -> TimeDelta {
    TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreakerState {
        CircuitBreakerState::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    #[test]
    fn defaults_match_documented_values() {
        let state = CircuitBreakerState::default();
        assert_eq!(state.config.failure_threshold, 3);
        assert_eq!(state.config.cooldown, Duration::from_secs(300));
        assert_eq!(state.status, CircuitStatus::Closed);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let mut state = breaker(3, 60);
        assert!(!state.record_failure(t0()));
        assert!(!state.record_failure(t0()));
        assert!(state.can_attempt(t0()));

        assert!(state.record_failure(t0()));
        assert_eq!(state.status_at(t0()), CircuitStatus::Open);
        assert!(!state.can_attempt(t0()));
        assert_eq!(state.time_until_retry(t0()), Some(Duration::from_secs(60)));
    }

    #[test]
    fn success_resets_failure_count() {
        let mut state = breaker(2, 60);
        state.record_failure(t0());
        state.record_success();
        assert!(!state.record_failure(t0()));
        assert_eq!(state.consecutive_failures, 1);
    }

    #[test]
    fn cooldown_elapsed_reports_half_open() {
        let mut state = breaker(1, 30);
        state.record_failure(t0());

        let before = t0() + TimeDelta::seconds(29);
        let after = t0() + TimeDelta::seconds(30);
        assert!(!state.can_attempt(before));
        assert_eq!(state.status_at(after), CircuitStatus::HalfOpen);
        assert!(state.can_attempt(after));
        assert_eq!(state.time_until_retry(after), None);
    }

    #[test]
    fn half_open_success_closes() {
        let mut state = breaker(1, 30);
        state.record_failure(t0());

        let trial = t0() + TimeDelta::seconds(30);
        assert_eq!(state.status_at(trial), CircuitStatus::HalfOpen);
        assert!(state.try_acquire(trial));
        state.record_success();

        assert_eq!(state.status_at(trial), CircuitStatus::Closed);
        assert_eq!(state.trial_started_at, None);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.opened_at, None);
    }

    #[test]
    fn half_open_failure_reopens_and_restarts_cooldown() {
        let mut state = breaker(3, 30);
        for _ in 0..3 {
            state.record_failure(t0());
        }

        let trial = t0() + TimeDelta::seconds(45);
        assert_eq!(state.status_at(trial), CircuitStatus::HalfOpen);
        assert!(state.record_failure(trial));

        assert_eq!(state.opened_at, Some(trial));
        assert!(!state.can_attempt(trial + TimeDelta::seconds(29)));
        assert!(state.can_attempt(trial + TimeDelta::seconds(30)));
    }

    #[test]
    fn half_open_admits_a_single_trial() {
        let mut state = breaker(1, 30);
        assert!(state.try_acquire(t0()));
        state.record_failure(t0());
        assert!(!state.try_acquire(t0() + TimeDelta::seconds(10)));

        let trial = t0() + TimeDelta::seconds(30);
        assert!(state.try_acquire(trial));
        assert!(!state.can_attempt(trial));
        assert!(!state.try_acquire(trial + TimeDelta::seconds(1)));
        assert_eq!(state.status_at(trial), CircuitStatus::HalfOpen);

        state.release_trial();
        assert!(state.try_acquire(trial + TimeDelta::seconds(2)));
    }

    #[test]
    fn abandoned_trial_is_reclaimable_after_cooldown() {
        let mut state = breaker(1, 30);
        state.record_failure(t0());

        let trial = t0() + TimeDelta::seconds(30);
        assert!(state.try_acquire(trial));
        assert!(!state.try_acquire(trial + TimeDelta::seconds(29)));
        assert!(state.try_acquire(trial + TimeDelta::seconds(30)));
    }

    #[test]
    fn failures_while_open_do_not_extend_cooldown() {
        let mut state = breaker(1, 30);
        state.record_failure(t0());
        assert!(!state.record_failure(t0() + TimeDelta::seconds(10)));
        assert_eq!(state.opened_at, Some(t0()));
    }
}
