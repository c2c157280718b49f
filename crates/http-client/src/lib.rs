// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Rate-limited, retrying HTTP client for external data providers
//!
//! One [`HttpClient`] wraps one provider endpoint and turns a flaky remote API into a
//! well-behaved one: requests wait for the provider's declared rate limit, transient
//! failures are retried with exponential backoff, and every physical attempt is
//! recorded in the shared [`InstrumentationCollector`](instrumentation::InstrumentationCollector).
//!
//! # Core Abstractions
//!
//! - **[`rate_limit`]**: pure token bucket plus minute/hour sliding windows
//! - **[`Backoff`] / [`RetryPolicy`]**: doubling delays, seeded from `Retry-After` on 429
//! - **[`HttpError`]**: failure taxonomy with retry classification and stable codes
//! - **[`RequestHooks`]**: optional per-attempt callbacks
//! - **[`ResponseSchema`]**: post-decode validation of typed responses
//! - **Health Check System**: [`HealthStatus`] reporting for provider probes

pub mod backoff;
pub mod client;
pub mod error;
pub mod health;
pub mod hooks;
pub mod rate_limit;
pub mod schema;

pub use backoff::{Backoff, RetryPolicy};
pub use client::{ApiCredential, ApiKeyPlacement, HttpClient, HttpClientConfig, RequestOptions};
pub use error::HttpError;
pub use health::{HealthCheckResult, HealthStatus};
#[cfg(test)]
pub use hooks::MockRequestHooks;
pub use hooks::{NoopHooks, RequestContext, RequestHooks};
pub use rate_limit::RateLimitState;
pub use schema::{ResponseSchema, ValidationIssue};
