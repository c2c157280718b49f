// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Resilience layer configuration
//!
//! Loaded with the `config` crate from, in increasing precedence:
//! 1. Built-in defaults
//! 2. `resilience.json`
//! 3. `resilience.{ENVIRONMENT}.json`
//! 4. `RESILIENCE__*` environment variables (`__` separates nesting levels)
//!
//! Every file is optional.

use std::{collections::BTreeMap, env, path::Path, time::Duration};

use config::{Config, Environment as ConfigEnv, File};
use serde::{Deserialize, Serialize};
use shared_types::RateLimitConfig;
use thiserror::Error;

use crate::{CircuitBreakerConfig, NonEmptyString, TimeoutMillis};

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_COOLDOWN_MS: u64 = 5 * 60 * 1000;
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration could not be loaded or is inconsistent
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("failed to load resilience configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Values parsed but violate a constraint
    #[error("invalid resilience configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Circuit breaker thresholds as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open a breaker
    pub failure_threshold: u32,
    /// Open duration in milliseconds
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

impl From<CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            cooldown: Duration::from_millis(settings.cooldown_ms),
        }
    }
}

/// Overrides for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Disabled providers are not instantiated
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// API key; falls back to the provider's declared environment variable
    #[serde(default, skip_serializing)]
    pub api_key: Option<NonEmptyString>,
    /// Replacement base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-attempt timeout
    #[serde(default)]
    pub timeout_ms: Option<TimeoutMillis>,
    /// Attempts per request
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Replacement rate limit
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            timeout_ms: None,
            max_retries: None,
            rate_limit: None,
        }
    }
}

impl ProviderSettings {
    /// The configured key, else the value of `env_var` when set and non-blank
    pub fn resolve_api_key(&self, env_var: Option<&str>) -> Option<NonEmptyString> {
        self.api_key.clone().or_else(|| {
            let value = env::var(env_var?).ok()?;
            NonEmptyString::new(value).ok()
        })
    }
}

/// Settings for one logical source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Provider tried first regardless of health
    #[serde(default)]
    pub preferred_provider: Option<String>,
    /// Per-provider overrides keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// Top-level configuration of the resilience layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Breaker thresholds shared by every provider
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    /// Metric ring size; unbounded when absent
    #[serde(default)]
    pub metrics_capacity: Option<usize>,
    /// Event bus buffer per subscriber
    pub event_capacity: usize,
    /// Per-source settings
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSettings>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerSettings::default(),
            metrics_capacity: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            sources: BTreeMap::new(),
        }
    }
}

impl ResilienceConfig {
    /// Load from the working directory and the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a source is malformed or a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self::load_from(Path::new("."), &environment)
    }

    /// Load `resilience.json` and `resilience.{environment}.json` from `dir`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a source is malformed or a value is out of range.
    pub fn load_from(dir: &Path, environment: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("circuit_breaker.failure_threshold", i64::from(DEFAULT_FAILURE_THRESHOLD))?
            .set_default("circuit_breaker.cooldown_ms", 300_000)?
            .set_default("event_capacity", 1024)?
            .add_source(File::from(dir.join("resilience.json")).required(false))
            .add_source(
                File::from(dir.join(format!("resilience.{}.json", environment.to_lowercase())))
                    .required(false),
            )
            .add_source(
                ConfigEnv::with_prefix("RESILIENCE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let resilience: Self = config.try_deserialize()?;
        resilience.validate()?;
        Ok(resilience)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.failure_threshold must be at least 1",
            ));
        }
        if self.circuit_breaker.cooldown_ms == 0 {
            return Err(ConfigError::invalid("circuit_breaker.cooldown_ms must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity must be at least 1"));
        }
        if self.metrics_capacity == Some(0) {
            return Err(ConfigError::invalid("metrics_capacity must be at least 1 when set"));
        }
        for (source, settings) in &self.sources {
            for (name, provider) in &settings.providers {
                if let Some(rate_limit) = &provider.rate_limit {
                    rate_limit.validate().map_err(|error| {
                        ConfigError::invalid(format!(
                            "sources.{source}.providers.{name}.rate_limit: {error}"
                        ))
                    })?;
                }
                if provider.max_retries == Some(0) {
                    return Err(ConfigError::invalid(format!(
                        "sources.{source}.providers.{name}.max_retries must be at least 1"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Settings for `name` under `source`, defaults when absent
    pub fn provider_settings(&self, source: &str, name: &str) -> ProviderSettings {
        self.sources
            .get(source)
            .and_then(|settings| settings.providers.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Breaker configuration
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        self.circuit_breaker.into()
    }
}
