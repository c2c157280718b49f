// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Caller-side response cache
//!
//! Keyed by [`Operation::cache_key`](crate::Operation::cache_key). The
//! [`ProviderManager`](crate::ProviderManager) never consults it on its own; callers
//! opt in through
//! [`execute_with_failover_cached`](crate::ProviderManager::execute_with_failover_cached).

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, trace};

const DEFAULT_TTL: Duration = Duration::from_secs(60);
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// A cached provider response
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// Response body
    pub data: Value,
    /// Provider that produced it
    pub provider: String,
    /// Insertion time
    pub cached_at: Instant,
    /// Last read
    pub last_accessed: Instant,
    /// Number of reads
    pub access_count: u64,
}

impl CachedResponse {
    fn new(data: Value, provider: String) -> Self {
        let now = Instant::now();
        Self {
            data,
            provider,
            cached_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Whether the entry is younger than `ttl`
    pub fn is_valid(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }

    fn accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
    }
}

/// TTL + LRU cache of provider responses
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CachedResponse>,
    ttl: Duration,
    max_entries: usize,
    stats: DashMap<String, u64>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    /// 60 s TTL, 10k entries
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }

    /// Custom TTL and capacity
    pub fn with_settings(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            stats: DashMap::new(),
        }
    }

    /// Look up a fresh entry, returning the body and the provider that served it
    pub fn get(&self, key: &str) -> Option<(Value, String)> {
        if let Some(mut cached) = self.entries.get_mut(key) {
            if cached.is_valid(self.ttl) {
                cached.accessed();
                self.increment_stat("hits");
                self.increment_stat(&format!("hits:{}", cached.provider));
                trace!(key, provider = %cached.provider, "cache hit");
                return Some((cached.data.clone(), cached.provider.clone()));
            }
            drop(cached);
            self.entries.remove(key);
            self.increment_stat("expired");
            debug!(key, "expired cache entry removed");
        }

        self.increment_stat("misses");
        None
    }

    /// Store a response, evicting the least recently used entry at capacity
    pub fn insert(&self, key: impl Into<String>, data: Value, provider: impl Into<String>) {
        let key = key.into();
        if !self.entries.contains_key(&key)
            && self.entries.len() >= self.max_entries
            && self.cleanup_expired() == 0
        {
            self.evict_least_recently_used();
        }

        let provider = provider.into();
        trace!(key = %key, provider = %provider, size = self.entries.len(), "storing response");
        self.entries.insert(key, CachedResponse::new(data, provider));
        self.increment_stat("stores");
    }

    /// Drop one entry
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid(self.ttl));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.add_stat("expired", removed as u64);
            debug!(removed, remaining = self.entries.len(), "cleaned up expired cache entries");
        }
        removed
    }

    /// Drop every entry and statistic
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.clear();
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current statistics
    pub fn get_stats(&self) -> ResponseCacheStats {
        let hits = self.get_stat("hits");
        let misses = self.get_stat("misses");
        let lookups = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64
        } else {
            0.0
        };

        let hits_by_provider = self
            .stats
            .iter()
            .filter_map(|item| {
                item.key()
                    .strip_prefix("hits:")
                    .map(|provider| (provider.to_string(), *item.value()))
            })
            .collect();

        ResponseCacheStats {
            entry_count: self.entries.len(),
            hits,
            misses,
            stores: self.get_stat("stores"),
            evictions: self.get_stat("evictions"),
            expired: self.get_stat("expired"),
            hit_rate,
            max_capacity: self.max_entries,
            ttl_seconds: self.ttl.as_secs(),
            hits_by_provider,
        }
    }

    fn evict_least_recently_used(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|item| (item.value().last_accessed, item.value().access_count))
            .map(|item| item.key().clone());

        if let Some((key, entry)) = oldest.and_then(|key| self.entries.remove(&key)) {
            self.increment_stat("evictions");
            info!(
                key = %key,
                provider = %entry.provider,
                access_count = entry.access_count,
                remaining_entries = self.entries.len(),
                "evicted lru cache entry due to capacity limit"
            );
        }
    }

    fn increment_stat(&self, key: &str) {
        self.add_stat(key, 1);
    }

    fn add_stat(&self, key: &str, amount: u64) {
        *self.stats.entry(key.to_string()).or_insert(0) += amount;
    }

    fn get_stat(&self, key: &str) -> u64 {
        self.stats.get(key).map_or(0, |v| *v)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheStats {
    /// Entries currently held
    pub entry_count: usize,
    /// Fresh lookups
    pub hits: u64,
    /// Lookups that found nothing fresh
    pub misses: u64,
    /// Inserts
    pub stores: u64,
    /// Capacity evictions
    pub evictions: u64,
    /// Entries dropped for age
    pub expired: u64,
    /// `hits / (hits + misses)`
    pub hit_rate: f64,
    /// Capacity
    pub max_capacity: usize,
    /// TTL in seconds
    pub ttl_seconds: u64,
    /// Hits per serving provider
    pub hits_by_provider: BTreeMap<String, u64>,
}
