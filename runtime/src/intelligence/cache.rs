// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Strategy cache: validated strategies reused across pages of one site.
//!
//! Keyed by `(site, page_type)`. Concurrent builders for the same key may
//! race; the first insert wins and later ones get the stored strategy back.
//! Only validated strategies are ever inserted, so a cancelled build leaves
//! nothing behind.
//!
//! ## LRU eviction
//!
//! When the cache exceeds `max_entries`, expired entries are dropped first,
//! then the least-recently-accessed one.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smartspider::{PageType, Strategy};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum number of cached strategies before LRU eviction.
const DEFAULT_MAX_ENTRIES: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StrategyKey {
    pub site: String,
    pub page_type: PageType,
}

impl StrategyKey {
    pub fn new(site: impl Into<String>, page_type: PageType) -> Self {
        Self {
            site: site.into(),
            page_type,
        }
    }
}

struct CacheEntry {
    strategy: Arc<Strategy>,
    cached_at: Instant,
    /// When the entry was last accessed (for LRU).
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.cached_at.elapsed() >= ttl)
    }
}

/// Concurrent strategy cache. Share it behind an `Arc`.
pub struct StrategyCache {
    entries: DashMap<StrategyKey, CacheEntry>,
    ttl: Option<Duration>,
    max_entries: usize,
}

impl Default for StrategyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyCache {
    /// Unbounded lifetime, default capacity.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            ttl: None,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Fresh strategy for the key, if any.
    pub fn get(&self, site: &str, page_type: PageType) -> Option<Arc<Strategy>> {
        let key = StrategyKey::new(site, page_type);
        let mut entry = self.entries.get_mut(&key)?;
        if entry.is_expired(self.ttl) {
            return None;
        }
        entry.last_accessed = Instant::now();
        Some(entry.strategy.clone())
    }

    /// Store `strategy` unless a fresh one is already cached for the key.
    /// Returns whichever strategy is cached afterwards.
    pub fn insert(&self, site: &str, page_type: PageType, strategy: Strategy) -> Arc<Strategy> {
        let key = StrategyKey::new(site, page_type);
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_lru();
        }

        let now = Instant::now();
        let fresh = CacheEntry {
            strategy: Arc::new(strategy),
            cached_at: now,
            last_accessed: now,
        };
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(self.ttl) {
                    let stored = fresh.strategy.clone();
                    occupied.insert(fresh);
                    stored
                } else {
                    tracing::debug!(
                        site = %occupied.key().site,
                        page_type = occupied.key().page_type.as_str(),
                        "strategy already cached, keeping first"
                    );
                    occupied.get_mut().last_accessed = now;
                    occupied.get().strategy.clone()
                }
            }
            Entry::Vacant(vacant) => {
                let stored = fresh.strategy.clone();
                vacant.insert(fresh);
                stored
            }
        }
    }

    pub fn invalidate(&self, site: &str, page_type: PageType) {
        self.entries.remove(&StrategyKey::new(site, page_type));
    }

    /// Evict expired entries, or failing that the least-recently-used one.
    fn evict_lru(&self) {
        let before = self.entries.len();
        self.cleanup_expired();
        if self.entries.len() < before {
            return;
        }

        let lru = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_accessed)
            .map(|e| e.key().clone());
        if let Some(key) = lru {
            tracing::info!(site = %key.site, page_type = key.page_type.as_str(), "evicting LRU strategy");
            self.entries.remove(&key);
        }
    }

    /// Remove all expired entries.
    pub fn cleanup_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
    }

    /// Number of cached strategies (including expired).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
