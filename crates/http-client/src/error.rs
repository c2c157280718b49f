// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for provider HTTP calls

use thiserror::Error;

use crate::schema::ValidationIssue;

const MAX_REPORTED_ISSUES: usize = 5;

/// Errors returned by [`HttpClient`](crate::HttpClient)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum HttpError {
    /// HTTP 429 after retries, or the local rate-limit wait exceeded its deadline
    #[error("Rate limit exceeded, retry after {retry_after_ms} ms")]
    RateLimit { retry_after_ms: u64 },

    /// 5xx response from the provider
    #[error("Service error {status}: {message}")]
    Service { status: u16, message: String },

    /// No response within the configured timeout
    #[error("Request timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Connection or transport failure
    #[error("Network error: {message}")]
    Network { message: String },

    /// 2xx body that failed to decode or validate
    #[error("Response validation failed: {}", format_issues(.issues))]
    ResponseValidation { issues: Vec<ValidationIssue> },

    /// Non-retryable 4xx response
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Client misconfiguration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl HttpError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. }
                | Self::Service { .. }
                | Self::Timeout { .. }
                | Self::Network { .. }
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimit { .. } => "RATE_LIMIT",
            Self::Service { .. } => "SERVICE_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::ResponseValidation { .. } => "RESPONSE_VALIDATION",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }

    /// HTTP status carried by the error, if a response arrived
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimit { .. } => Some(429),
            Self::Service { status, .. } | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    let shown = issues
        .iter()
        .take(MAX_REPORTED_ISSUES)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    match issues.len().checked_sub(MAX_REPORTED_ISSUES) {
        Some(more) if more > 0 => format!("{shown} \u{2026} and {more} more"),
        _ => shown,
    }
}
