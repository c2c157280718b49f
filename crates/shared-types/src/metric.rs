// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-attempt request metrics

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP methods issued by provider clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
}

impl HttpMethod {
    /// Returns the method as an uppercase token
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical HTTP attempt against a provider
///
/// Records are created once by the HTTP client and then only shared behind `Arc`;
/// `status` is `0` when no response was received (timeout or transport failure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetric {
    /// Provider name
    pub provider: String,
    /// Logical source (blockchain or exchange) the provider serves
    pub service: String,
    /// Endpoint path with query strings and secrets removed
    pub endpoint: String,
    /// HTTP method
    pub method: HttpMethod,
    /// HTTP status code, `0` when no response arrived
    pub status: u16,
    /// Wall time of the attempt
    pub duration_ms: u64,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Error summary for failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestMetric {
    /// Whether the attempt received a 2xx response
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Coarse status label used for metric labels: `2xx`, `4xx`, `5xx` or `error`
    pub fn status_class(&self) -> &'static str {
        match self.status {
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(status: u16) -> RequestMetric {
        RequestMetric {
            provider: "mempool.space".to_string(),
            service: "bitcoin".to_string(),
            endpoint: "/api/address/{address}/txs".to_string(),
            method: HttpMethod::Get,
            status,
            duration_ms: 120,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn status_classification() {
        assert!(metric(200).is_success());
        assert!(metric(204).is_success());
        assert!(!metric(429).is_success());
        assert!(!metric(0).is_success());
        assert_eq!(metric(503).status_class(), "5xx");
        assert_eq!(metric(404).status_class(), "4xx");
        assert_eq!(metric(0).status_class(), "error");
    }

    #[test]
    fn method_serializes_uppercase() {
        let json = serde_json::to_value(metric(200)).unwrap();
        assert_eq!(json["method"], "GET");
        assert!(json.get("error").is_none());
    }
}
