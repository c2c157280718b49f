// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! Server lifecycle errors plus request errors mapped onto HTTP responses. An
//! exhausted failover becomes `502 Bad Gateway` carrying every provider attempt.

use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use external_apis::{ConfigError as ResilienceConfigError, ProviderError};
use instrumentation::InstrumentationError;
use serde_json::json;
use thiserror::Error;

/// Errors raised while running the gateway or serving a request
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Provider settings could not be loaded
    #[error("Provider configuration error: {0}")]
    ResilienceConfig(#[from] ResilienceConfigError),

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server startup errors
    #[error("Server startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server shutdown errors
    #[error("Server shutdown failed: {source}")]
    Shutdown {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Task join errors for async operations
    #[error("Task join error: {source}")]
    TaskJoin {
        /// Underlying tokio join error
        #[source]
        source: tokio::task::JoinError,
    },

    /// The path named an operation that does not exist
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failover or provider lookup failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Metrics could not be rendered
    #[error(transparent)]
    Metrics(#[from] InstrumentationError),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(..) => StatusCode::BAD_REQUEST,
            Self::Provider(error) => match error {
                ProviderError::InvalidOperation { .. } => StatusCode::BAD_REQUEST,
                ProviderError::NoProviders { .. } | ProviderError::UnknownProvider { .. } => {
                    StatusCode::NOT_FOUND
                }
                ProviderError::NoCapableProviders { .. } => StatusCode::NOT_IMPLEMENTED,
                ProviderError::AllProvidersFailed { .. } | ProviderError::Provider { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                ProviderError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Config { .. }
            | Self::ResilienceConfig(..)
            | Self::Bind { .. }
            | Self::Startup { .. }
            | Self::Shutdown { .. }
            | Self::TaskJoin { .. }
            | Self::Metrics(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let json_body = match &self {
            ServerError::Provider(
                error @ (ProviderError::AllProvidersFailed { attempts, .. }
                | ProviderError::InvalidOperation { attempts, .. }),
            ) => {
                json!({
                    "error": error.to_string(),
                    "code": error.code(),
                    "status": status.as_u16(),
                    "attempts": attempts,
                })
            }
            ServerError::Provider(error) => json!({
                "error": error.to_string(),
                "code": error.code(),
                "status": status.as_u16(),
            }),
            _ => json!({
                "error": self.to_string(),
                "status": status.as_u16(),
            }),
        };

        (status, Json(json_body)).into_response()
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::TaskJoin { source }
    }
}

#[cfg(test)]
mod tests {
    use external_apis::ProviderAttempt;
    use http_client::HttpError;
    use shared_types::OperationKind;

    use super::*;

    #[test]
    fn provider_errors_map_to_gateway_statuses() {
        let missing = ServerError::from(ProviderError::NoProviders {
            source_name: "solana".to_string(),
        });
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let unsupported = ServerError::from(ProviderError::NoCapableProviders {
            source_name: "bitcoin".to_string(),
            operation: OperationKind::GetTokenBalances,
        });
        assert_eq!(unsupported.status_code(), StatusCode::NOT_IMPLEMENTED);

        let invalid = ServerError::ValidationError("unknown operation kind: x".to_string());
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let incomplete = ServerError::from(ProviderError::InvalidOperation {
            source_name: "bitcoin".to_string(),
            operation: OperationKind::GetTransaction,
            attempts: vec![ProviderAttempt::failed(
                "blockstream.info",
                &HttpError::configuration("blockstream.info needs `txid`"),
            )],
        });
        assert_eq!(incomplete.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn exhausted_failover_lists_attempts() {
        let error = ServerError::from(ProviderError::AllProvidersFailed {
            source_name: "bitcoin".to_string(),
            operation: OperationKind::GetAddressBalance,
            attempts: vec![
                ProviderAttempt::failed("blockstream.info", &HttpError::network("reset")),
                ProviderAttempt::circuit_open("mempool.space", 1_500),
            ],
        });
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "ALL_PROVIDERS_FAILED");
        assert_eq!(body["attempts"][0]["provider"], "blockstream.info");
        assert_eq!(body["attempts"][1]["retry_in_ms"], 1_500);
    }
}
