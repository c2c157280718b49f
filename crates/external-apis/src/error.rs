// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Provider orchestration errors

use std::fmt;

use http_client::HttpError;
use serde::{Deserialize, Serialize};
use shared_types::OperationKind;
use thiserror::Error;

/// Result alias for provider orchestration
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Why one candidate did not produce a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AttemptOutcome {
    /// The provider was called and failed
    Failed { code: String, message: String },
    /// The provider was skipped because its breaker is open
    CircuitOpen { retry_in_ms: u64 },
}

/// Per-provider summary carried by [`ProviderError::AllProvidersFailed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    /// Provider name
    pub provider: String,
    /// What happened
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl ProviderAttempt {
    /// A call that returned `error`
    pub fn failed(provider: &str, error: &HttpError) -> Self {
        Self {
            provider: provider.to_string(),
            outcome: AttemptOutcome::Failed {
                code: error.code().to_string(),
                message: error.to_string(),
            },
        }
    }

    /// A candidate skipped by its open breaker
    pub fn circuit_open(provider: &str, retry_in_ms: u64) -> Self {
        Self {
            provider: provider.to_string(),
            outcome: AttemptOutcome::CircuitOpen { retry_in_ms },
        }
    }
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Failed { message, .. } => write!(f, "{}: {message}", self.provider),
            AttemptOutcome::CircuitOpen { retry_in_ms } => {
                write!(f, "{}: circuit open (retry in {retry_in_ms} ms)", self.provider)
            }
        }
    }
}

/// Errors returned by the provider manager and registry
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum ProviderError {
    /// Nothing is registered for the source
    #[error("No providers registered for source {source_name}")]
    NoProviders { source_name: String },

    /// Providers exist but none supports the operation
    #[error("No provider for source {source_name} supports {operation}")]
    NoCapableProviders {
        source_name: String,
        operation: OperationKind,
    },

    /// Every candidate failed or was skipped
    #[error("All providers failed for {source_name} {operation}: {}", join_attempts(.attempts))]
    AllProvidersFailed {
        source_name: String,
        operation: OperationKind,
        attempts: Vec<ProviderAttempt>,
    },

    /// Every candidate rejected the operation before sending a request
    #[error("Invalid {operation} request for {source_name}: {}", join_attempts(.attempts))]
    InvalidOperation {
        source_name: String,
        operation: OperationKind,
        attempts: Vec<ProviderAttempt>,
    },

    /// Lookup of a provider that is not registered
    #[error("Unknown provider {name} for source {source_name}")]
    UnknownProvider { source_name: String, name: String },

    /// A direct call to one provider failed
    #[error("{name} ({source_name}) failed: {error}")]
    Provider {
        source_name: String,
        name: String,
        error: HttpError,
    },

    /// Invalid registration or settings
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ProviderError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoProviders { .. } => "NO_PROVIDERS",
            Self::NoCapableProviders { .. } => "NO_CAPABLE_PROVIDERS",
            Self::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
            Self::InvalidOperation { .. } => "INVALID_OPERATION",
            Self::UnknownProvider { .. } => "UNKNOWN_PROVIDER",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }
}

impl From<HttpError> for ProviderError {
    fn from(error: HttpError) -> Self {
        Self::configuration(error.to_string())
    }
}

fn join_attempts(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
