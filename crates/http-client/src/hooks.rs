// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-attempt observation hooks

use std::time::Duration;

use shared_types::{HttpMethod, RequestMetric};
use uuid::Uuid;

use crate::HttpError;

/// Identity of one physical attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Shared by every attempt of one logical request
    pub request_id: Uuid,
    /// Provider name
    pub provider: String,
    /// Logical source
    pub service: String,
    /// Sanitized endpoint
    pub endpoint: String,
    /// HTTP method
    pub method: HttpMethod,
    /// 1-based attempt number
    pub attempt: u32,
}

/// Callbacks invoked around each attempt
///
/// Every method defaults to a no-op so implementors only override what they need.
/// Hooks run inline on the request task and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait RequestHooks: Send + Sync {
    /// Before the request is sent
    fn on_request_start(&self, _context: &RequestContext) {}

    /// After a 2xx response decoded and validated
    fn on_request_success(&self, _context: &RequestContext, _metric: &RequestMetric) {}

    /// After any failed attempt, retried or not
    fn on_request_failure(&self, _context: &RequestContext, _error: &HttpError) {}

    /// After a 429 response, with the computed backoff
    fn on_rate_limited(&self, _context: &RequestContext, _retry_after_ms: u64) {}

    /// Before sleeping ahead of the next attempt
    fn on_backoff(&self, _context: &RequestContext, _delay: Duration, _error: &HttpError) {}
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl RequestHooks for NoopHooks {}
