// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Validated configuration values
//!
//! [`NonEmptyString`] and [`TimeoutMillis`] make invalid provider settings
//! unrepresentable: they reject bad input when constructed or deserialized, so
//! code holding one never re-validates.
//!
//! # Examples
//!
//! ```rust
//! use external_apis::{NonEmptyString, TimeoutMillis};
//!
//! let key = NonEmptyString::new("sk-1234567890").expect("valid key");
//! assert_eq!(key.as_str(), "sk-1234567890");
//! assert!(NonEmptyString::new("   \t\n  ").is_err());
//!
//! let timeout = TimeoutMillis::new(2_500).expect("valid timeout");
//! assert_eq!(timeout.as_duration().as_millis(), 2_500);
//! assert!(TimeoutMillis::new(0).is_err());
//! ```

use core::fmt;
use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Deserializer, Serialize, de};
use thiserror::Error;

const MAX_TIMEOUT_MS: u64 = 300_000;

/// Rejected configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum ValidationError {
    /// Empty or whitespace-only string
    #[error("String cannot be empty or whitespace-only")]
    EmptyString,
    /// Timeout outside `1..=300000` ms
    #[error("timeout must be between 1 and {MAX_TIMEOUT_MS} ms, got {millis}")]
    TimeoutOutOfRange { millis: u64 },
}

/// A string with at least one non-whitespace character
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NonEmptyString(Box<str>);

impl NonEmptyString {
    /// Validate and wrap a string
    ///
    /// Leading and trailing whitespace is kept; whitespace-only input is rejected.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.trim().is_empty() {
            Err(ValidationError::EmptyString)
        } else {
            Ok(Self(s.into_boxed_str()))
        }
    }

    /// Borrow the contents
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Values are frequently credentials, so they never reach debug output.
impl fmt::Debug for NonEmptyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NonEmptyString(<{} chars>)", self.0.chars().count())
    }
}

impl fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NonEmptyString {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for NonEmptyString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(de::Error::custom)
    }
}

/// A request timeout between 1 ms and 5 minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TimeoutMillis(u64);

impl TimeoutMillis {
    /// Validate a timeout in milliseconds
    pub fn new(millis: u64) -> Result<Self, ValidationError> {
        if millis == 0 || millis > MAX_TIMEOUT_MS {
            return Err(ValidationError::TimeoutOutOfRange { millis });
        }
        Ok(Self(millis))
    }

    /// Milliseconds
    pub fn value(self) -> u64 {
        self.0
    }

    /// As a [`Duration`]
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl<'de> Deserialize<'de> for TimeoutMillis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Self::new(millis).map_err(de::Error::custom)
    }
}
