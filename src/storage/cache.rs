use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use lru::LruCache;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::news::ArticleList;
use crate::storage::persistent_cache::{PersistentCache, PersistentCacheConfig};
use crate::storage::traits::{ArticleCache, PreferenceListener};

pub const CACHE_KEY_PREFIX: &str = "news_cache_";
pub const DEFAULT_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Namespaced cache key for a customer.
pub fn cache_key(user_id: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, user_id)
}

/// Cache entry with expiration tracking
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    pub access_count: u64,
    pub last_accessed: SystemTime,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            data,
            created_at: now,
            expires_at: now + ttl,
            access_count: 0,
            last_accessed: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }

    pub fn access(&mut self) -> &T {
        self.access_count += 1;
        self.last_accessed = SystemTime::now();
        &self.data
    }

    pub fn age(&self) -> Duration {
        SystemTime::now().duration_since(self.created_at)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub total_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_invalidation(&mut self) {
        self.invalidations += 1;
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: DEFAULT_TTL,
        }
    }
}

/// Per-customer article cache with TTL expiry and LRU bound.
///
/// Each entry holds the full, unsliced list of one customer. A write always
/// replaces the whole list. With persistence enabled, every mutation is
/// followed by a snapshot to disk.
#[derive(Clone)]
pub struct NewsCache {
    entries: Arc<RwLock<LruCache<String, CacheEntry<ArticleList>>>>,
    stats: Arc<RwLock<CacheStats>>,
    config: CacheConfig,
    persistence: Option<Arc<PersistentCache>>,
}

impl NewsCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries)
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            stats: Arc::new(RwLock::new(CacheStats::default())),
            config,
            persistence: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(CacheConfig {
            max_entries: capacity,
            ..Default::default()
        })
    }

    /// Cache backed by a snapshot file; unexpired entries are loaded right away.
    ///
    /// Leftover temp files and a snapshot over the size limit are removed first.
    pub fn with_persistence(config: CacheConfig, persistent_config: PersistentCacheConfig) -> Result<Self> {
        let persistent = PersistentCache::new(persistent_config)?;
        persistent.cleanup()?;
        let mut cache = Self::new(config);

        if let Some(data) = persistent.load()? {
            let mut entries = cache.entries.write();
            for (key, entry) in data.entries {
                entries.put(key, entry.into());
            }
            cache.stats.write().total_entries = entries.len();
        }

        cache.persistence = Some(Arc::new(persistent));
        Ok(cache)
    }

    pub fn get(&self, user_id: &str) -> Option<ArticleList> {
        let key = cache_key(user_id);
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        if let Some(entry) = entries.get_mut(&key) {
            if entry.is_expired() {
                entries.pop(&key);
                stats.record_expiration();
                stats.record_miss();
                stats.total_entries = entries.len();
                return None;
            }

            stats.record_hit();
            Some(Arc::clone(entry.access()))
        } else {
            stats.record_miss();
            None
        }
    }

    pub fn put(&self, user_id: &str, articles: ArticleList) -> Result<()> {
        self.put_with_ttl(user_id, articles, self.config.default_ttl)
    }

    pub fn put_with_ttl(&self, user_id: &str, articles: ArticleList, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(articles, ttl);
        {
            let mut entries = self.entries.write();
            let mut stats = self.stats.write();

            if let Some((evicted, _)) = entries.push(cache_key(user_id), entry) {
                if evicted != cache_key(user_id) {
                    stats.record_eviction();
                }
            }
            stats.total_entries = entries.len();
        }
        debug!("Cached article list for user {} (ttl {:?})", user_id, ttl);
        self.persist()
    }

    pub fn invalidate(&self, user_id: &str) -> Result<bool> {
        let removed = {
            let mut entries = self.entries.write();
            let mut stats = self.stats.write();

            let removed = entries.pop(&cache_key(user_id)).is_some();
            if removed {
                stats.record_invalidation();
            }
            stats.total_entries = entries.len();
            removed
        };

        if removed {
            debug!("Invalidated cached news for user {}", user_id);
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        {
            let mut entries = self.entries.write();
            entries.clear();
            self.stats.write().total_entries = 0;
        }
        self.persist()
    }

    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            entries.pop(&key);
            stats.record_expiration();
        }

        stats.total_entries = entries.len();
        count
    }

    fn persist(&self) -> Result<()> {
        let Some(persistent) = &self.persistence else {
            return Ok(());
        };

        let snapshot: HashMap<String, CacheEntry<ArticleList>> = {
            let entries = self.entries.read();
            entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect()
        };

        persistent.save(&snapshot)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// True if an entry is stored, expired or not.
    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.read().contains(&cache_key(user_id))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read();
        entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

impl Default for NewsCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ArticleCache for NewsCache {
    fn get(&self, user_id: &str) -> Option<ArticleList> {
        NewsCache::get(self, user_id)
    }

    fn put(&self, user_id: &str, articles: ArticleList) -> Result<()> {
        NewsCache::put(self, user_id, articles)
    }

    fn invalidate(&self, user_id: &str) -> Result<bool> {
        NewsCache::invalidate(self, user_id)
    }
}

impl PreferenceListener for NewsCache {
    fn preferences_saved(&self, user_id: &str) {
        if let Err(e) = self.invalidate(user_id) {
            warn!("Failed to invalidate cached news for user {}: {}", user_id, e);
        }
    }
}
