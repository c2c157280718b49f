// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the provider resilience layer
//!
//! This crate provides the records that flow between the HTTP client, the provider
//! manager and the instrumentation layer, avoiding circular dependencies between them.
//! Nothing in here performs I/O.

pub mod event;
pub mod metric;
pub mod operation;
pub mod rate_limit;
pub mod status;

pub use event::ProviderEvent;
pub use metric::{HttpMethod, RequestMetric};
pub use operation::{OperationKind, ParseOperationKindError};
pub use rate_limit::{RateLimitConfig, RateLimitConfigError};
pub use status::ProviderStatus;
