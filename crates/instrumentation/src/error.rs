// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for instrumentation operations

use thiserror::Error;

/// Result type alias for instrumentation operations
pub type InstrumentationResult<T> = Result<T, InstrumentationError>;

/// Errors raised while exporting observability data
#[derive(Debug, Error)]
pub enum InstrumentationError {
    /// Prometheus text encoding failed
    #[error("Metrics encoding error: {message}")]
    Encode {
        /// Encoder message
        message: String,
    },
}

impl InstrumentationError {
    /// Create an encoding error
    pub fn encode<T: ToString>(message: T) -> Self {
        Self::Encode {
            message: message.to_string(),
        }
    }
}

impl From<prometheus::Error> for InstrumentationError {
    fn from(error: prometheus::Error) -> Self {
        Self::encode(error)
    }
}

impl From<std::string::FromUtf8Error> for InstrumentationError {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::encode(error)
    }
}
