// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Response validation hooks for typed decoding

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// One problem found while decoding or validating a response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Location of the problem, `$` for the document root
    pub path: String,
    /// What was wrong
    pub message: String,
}

impl ValidationIssue {
    /// Create an issue at `path`
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn from_decode_error(error: &serde_json::Error) -> Self {
        Self::new(
            "$",
            format!("{error} (line {}, column {})", error.line(), error.column()),
        )
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

type Validator<T> = dyn Fn(&T) -> Result<(), Vec<ValidationIssue>> + Send + Sync;

/// Post-decode checks applied to a typed response
///
/// Decoding into `T` already enforces the shape; the schema adds semantic checks that
/// serde cannot express (non-empty lists, status fields, value ranges).
pub struct ResponseSchema<T> {
    name: &'static str,
    validator: Arc<Validator<T>>,
}

impl<T> ResponseSchema<T> {
    /// Build a schema from a validation function
    pub fn new<F>(name: &'static str, validator: F) -> Self
    where
        F: Fn(&T) -> Result<(), Vec<ValidationIssue>> + Send + Sync + 'static,
    {
        Self {
            name,
            validator: Arc::new(validator),
        }
    }

    /// Schema that accepts any successfully decoded value
    pub fn any(name: &'static str) -> Self {
        Self::new(name, |_| Ok(()))
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the checks
    pub fn validate(&self, value: &T) -> Result<(), Vec<ValidationIssue>> {
        (self.validator)(value)
    }
}

impl<T> Clone for ResponseSchema<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            validator: Arc::clone(&self.validator),
        }
    }
}

impl<T> fmt::Debug for ResponseSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSchema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
