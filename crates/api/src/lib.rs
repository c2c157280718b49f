// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Provider gateway server
//!
//! Exposes the resilience layer over HTTP with Axum: one fetch endpoint that fails
//! over between providers, plus the health, metrics and live status views operators
//! need to watch them.
//!
//! # Module Structure
//!
//! - [`config`]: Server configuration with hierarchical loading
//! - [`error`]: Error types and their HTTP responses
//! - [`state`]: Shared handles and the cancellation token
//! - [`server`]: Server lifecycle and coordinated shutdown
//! - [`routes`]: Route table and handlers
//!
//! # Endpoints
//!
//! | route                                          | answer                         |
//! |------------------------------------------------|--------------------------------|
//! | `GET /health`                                  | concurrent probe of providers  |
//! | `GET /metrics`                                 | Prometheus text                |
//! | `GET /v1/metrics/summary`                      | `MetricsSummary` JSON          |
//! | `GET /v1/sources/{source}/providers`           | status rows and snapshots      |
//! | `GET /v1/sources/{source}/{operation}/{address}` | `{provider, data}`, 502 when exhausted |

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{CacheSettings, Environment, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{Server, ShutdownConfig};
pub use state::{HealthCheck, ServerState};
