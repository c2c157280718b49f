// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Static provider registry
//!
//! Providers are registered explicitly, by name and source, together with a factory
//! that builds a live instance from its settings. Nothing is discovered at runtime:
//! [`register_builtin_providers`](crate::register_builtin_providers) is the only place
//! the builtin catalog enters the registry.

use std::{collections::BTreeMap, fmt, sync::Arc};

use instrumentation::{EventBus, InstrumentationCollector};
use tracing::debug;

use crate::{NonEmptyString, Provider, ProviderError, ProviderMetadata, ProviderSettings};

/// Everything a factory needs to build a provider
#[derive(Debug, Clone)]
pub struct ProviderInit {
    /// Configured overrides
    pub settings: ProviderSettings,
    /// Resolved API key
    pub api_key: Option<NonEmptyString>,
    /// Metric sink shared by every client
    pub collector: Arc<InstrumentationCollector>,
    /// Event bus shared by every client
    pub events: EventBus,
}

impl ProviderInit {
    /// Defaults with no key
    pub fn new(collector: Arc<InstrumentationCollector>, events: EventBus) -> Self {
        Self {
            settings: ProviderSettings::default(),
            api_key: None,
            collector,
            events,
        }
    }

    /// Replace the settings
    #[must_use]
    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: NonEmptyString) -> Self {
        self.api_key = Some(api_key);
        self
    }
}

/// Builds a provider instance
pub type ProviderFactory = fn(ProviderInit) -> Result<Arc<dyn Provider>, ProviderError>;

/// A registry entry
#[derive(Clone)]
pub struct ProviderRegistration {
    /// Declared identity and limits
    pub metadata: ProviderMetadata,
    /// Constructor
    pub factory: ProviderFactory,
}

impl fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("source", &self.metadata.source)
            .field("name", &self.metadata.name)
            .finish_non_exhaustive()
    }
}

/// Known providers keyed by `(source, name)`
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    registrations: BTreeMap<(String, String), ProviderRegistration>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if `(source, name)` is already taken.
    pub fn register(
        &mut self,
        metadata: ProviderMetadata,
        factory: ProviderFactory,
    ) -> Result<(), ProviderError> {
        let key = (metadata.source.clone(), metadata.name.clone());
        if self.registrations.contains_key(&key) {
            return Err(ProviderError::configuration(format!(
                "provider {} is already registered for source {}",
                key.1, key.0
            )));
        }
        debug!(source = %key.0, provider = %key.1, "registered provider");
        self.registrations
            .insert(key, ProviderRegistration { metadata, factory });
        Ok(())
    }

    /// Look up one registration
    pub fn get(&self, source: &str, name: &str) -> Option<&ProviderRegistration> {
        self.registrations
            .get(&(source.to_string(), name.to_string()))
    }

    /// Registrations for `source`, ordered by priority then name
    pub fn for_source(&self, source: &str) -> Vec<&ProviderRegistration> {
        let mut registrations: Vec<_> = self
            .registrations
            .iter()
            .filter(|((registered, _), _)| registered == source)
            .map(|(_, registration)| registration)
            .collect();
        registrations.sort_by_key(|registration| registration.metadata.priority);
        registrations
    }

    /// Every registered source
    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self
            .registrations
            .keys()
            .map(|(source, _)| source.as_str())
            .collect();
        sources.dedup();
        sources
    }

    /// Every registration, grouped by source
    pub fn iter(&self) -> impl Iterator<Item = &ProviderRegistration> {
        self.registrations.values()
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Instantiate a registered provider
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] for an unregistered pair, or whatever
    /// the factory returns.
    pub fn create(
        &self,
        source: &str,
        name: &str,
        init: ProviderInit,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let registration =
            self.get(source, name)
                .ok_or_else(|| ProviderError::UnknownProvider {
                    source_name: source.to_string(),
                    name: name.to_string(),
                })?;
        (registration.factory)(init)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, time::Duration};

    use http_client::{HealthCheckResult, HttpError};
    use serde_json::Value;
    use shared_types::{OperationKind, RateLimitConfig};

    use super::*;
    use crate::{HealthCheck, Operation, ProviderFuture};

    #[derive(Debug)]
    struct StaticProvider {
        metadata: ProviderMetadata,
    }

    impl Provider for StaticProvider {
        fn metadata(&self) -> &ProviderMetadata {
            &self.metadata
        }

        fn execute<'a>(&'a self, _operation: &'a Operation) -> ProviderFuture<'a, Value> {
            Box::pin(async { Ok(Value::Null) })
        }

        fn is_healthy(
            &self,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = HealthCheckResult> + Send + '_>>
        {
            Box::pin(async {
                let error = HttpError::network("offline");
                HealthCheckResult::from_probe(Err(&error), Duration::default())
            })
        }
    }

    fn metadata(source: &str, name: &str, priority: u32) -> ProviderMetadata {
        ProviderMetadata {
            name: name.to_string(),
            source: source.to_string(),
            priority,
            rate_limit: RateLimitConfig::default(),
            capabilities: BTreeSet::from([OperationKind::GetAddressBalance]),
            base_url: "https://example.invalid".to_string(),
            api_key_env: None,
            requires_api_key: false,
            health_check: HealthCheck::any_json("/status"),
        }
    }

    fn static_factory(_init: ProviderInit) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(Arc::new(StaticProvider {
            metadata: metadata("bitcoin", "static", 0),
        }))
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(metadata("bitcoin", "static", 0), static_factory)
            .unwrap();
        let error = registry
            .register(metadata("bitcoin", "static", 1), static_factory)
            .unwrap_err();
        assert_eq!(error.code(), "CONFIGURATION_ERROR");

        registry
            .register(metadata("ethereum", "static", 0), static_factory)
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.sources(), vec!["bitcoin", "ethereum"]);
    }

    #[test]
    fn source_listing_follows_priority() {
        let mut registry = ProviderRegistry::new();
        registry.register(metadata("bitcoin", "a", 2), static_factory).unwrap();
        registry.register(metadata("bitcoin", "b", 0), static_factory).unwrap();
        registry.register(metadata("bitcoin", "c", 1), static_factory).unwrap();

        let names: Vec<_> = registry
            .for_source("bitcoin")
            .into_iter()
            .map(|registration| registration.metadata.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "c", "a"]);
        assert!(registry.for_source("solana").is_empty());
    }

    #[test]
    fn create_unknown_provider_fails() {
        let registry = ProviderRegistry::new();
        let init =
            ProviderInit::new(Arc::new(InstrumentationCollector::new()), EventBus::default());
        let error = registry.create("bitcoin", "nope", init).unwrap_err();
        assert_eq!(error.code(), "UNKNOWN_PROVIDER");
    }
}
