use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::Serialize;

use crate::activity::ActivityLogger;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::news::{paginate, ArticleList, ArticleRecord, NewsClient, NewsSource, UserPreferences};
use crate::storage::cache::{CacheConfig, NewsCache};
use crate::storage::persistent_cache::PersistentCacheConfig;
use crate::storage::preferences::{FilePreferenceStore, MemoryPreferenceStore};
use crate::storage::traits::{ArticleCache, PreferenceListener, PreferenceStore};

/// An owned page of a customer's cached articles.
#[derive(Debug, Clone, Serialize)]
pub struct NewsPage {
    pub articles: Vec<ArticleRecord>,
    pub page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RepositoryStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_fetches: u64,
    pub fetch_failures: u64,
    pub preference_saves: u64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Default)]
struct RepositoryMetrics {
    cache_hits: u64,
    cache_misses: u64,
    upstream_fetches: u64,
    fetch_failures: u64,
    preference_saves: u64,
    total_response_time_ms: u64,
    operation_count: u64,
}

/// Read-through façade over preferences, cache and the news source.
///
/// Successful fetches are cached; failures never are, so the next request
/// retries upstream.
#[derive(Clone)]
pub struct NewsRepository {
    preferences: Arc<dyn PreferenceStore>,
    cache: Arc<dyn ArticleCache>,
    source: Arc<dyn NewsSource>,
    listeners: Vec<Arc<dyn PreferenceListener>>,
    page_size: usize,
    metrics: Arc<parking_lot::RwLock<RepositoryMetrics>>,
}

impl NewsRepository {
    /// The cache doubles as the first preference listener.
    pub fn new<C>(
        preferences: Arc<dyn PreferenceStore>,
        cache: Arc<C>,
        source: Arc<dyn NewsSource>,
        page_size: usize,
    ) -> Self
    where
        C: ArticleCache + PreferenceListener + 'static,
    {
        let listener: Arc<dyn PreferenceListener> = cache.clone();
        Self {
            preferences,
            cache,
            source,
            listeners: vec![listener],
            page_size: page_size.max(1),
            metrics: Arc::new(parking_lot::RwLock::new(RepositoryMetrics::default())),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn PreferenceListener>) {
        self.listeners.push(listener);
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn record_operation_time(&self, duration: Duration) {
        let mut metrics = self.metrics.write();
        metrics.total_response_time_ms += duration.as_millis() as u64;
        metrics.operation_count += 1;
    }

    /// Cached articles for the customer, fetching upstream on a miss.
    ///
    /// `Ok(None)` means the upstream fetch failed; the failure is already in
    /// the customer's activity log.
    pub async fn get_articles_for_user(&self, user_id: &str) -> Result<Option<ArticleList>> {
        let start = Instant::now();

        if let Some(articles) = self.cache.get(user_id) {
            self.metrics.write().cache_hits += 1;
            self.record_operation_time(start.elapsed());
            return Ok(Some(articles));
        }
        self.metrics.write().cache_misses += 1;

        let preferences = self
            .preferences
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserPreferences::empty(user_id));

        self.metrics.write().upstream_fetches += 1;
        let result = self.source.fetch(&preferences).await;

        let outcome = match result {
            Ok(articles) => {
                let articles: ArticleList = Arc::new(articles);
                if let Err(e) = self.cache.put(user_id, Arc::clone(&articles)) {
                    tracing::warn!("Failed to cache news for user {}: {}", user_id, e);
                }
                Some(articles)
            }
            Err(e) => {
                tracing::warn!("News fetch for user {} failed ({}): {}", user_id, e.error_code(), e);
                self.metrics.write().fetch_failures += 1;
                None
            }
        };

        self.record_operation_time(start.elapsed());
        Ok(outcome)
    }

    pub async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        self.preferences.get(user_id).await
    }

    /// Overwrite the customer's preferences and notify listeners.
    pub async fn save_preferences(
        &self,
        user_id: &str,
        interest: &str,
        domains: &str,
        date_from: &str,
        date_to: &str,
    ) -> Result<()> {
        let preferences = UserPreferences::new(user_id, interest, domains, date_from, date_to);
        self.preferences.save(&preferences).await?;
        self.metrics.write().preference_saves += 1;

        for listener in &self.listeners {
            listener.preferences_saved(user_id);
        }

        tracing::info!("Saved news preferences for user {}", user_id);
        Ok(())
    }

    /// Drop the customer's cached list without touching preferences.
    pub fn invalidate(&self, user_id: &str) -> Result<bool> {
        self.cache.invalidate(user_id)
    }

    /// Slice of the already cached list; never calls upstream.
    pub fn paginate_for_user(&self, user_id: &str, page: usize) -> Result<NewsPage> {
        let articles = self
            .cache
            .get(user_id)
            .ok_or_else(|| Error::NoCachedNews(user_id.to_string()))?;

        let slice = paginate(&articles, page, self.page_size);
        if slice.is_empty() {
            return Err(Error::EmptyPage {
                page: slice.page,
                total_pages: slice.total_pages,
            });
        }

        Ok(NewsPage {
            articles: slice.items.to_vec(),
            page: slice.page,
            total_pages: slice.total_pages,
        })
    }

    /// First page for the account view, fetching if needed.
    pub async fn first_page(&self, user_id: &str) -> Result<Option<NewsPage>> {
        let Some(articles) = self.get_articles_for_user(user_id).await? else {
            return Ok(None);
        };

        let slice = paginate(&articles, 1, self.page_size);
        Ok(Some(NewsPage {
            articles: slice.items.to_vec(),
            page: slice.page,
            total_pages: slice.total_pages,
        }))
    }

    pub fn stats(&self) -> RepositoryStats {
        let metrics = self.metrics.read();

        let avg_response_time_ms = if metrics.operation_count > 0 {
            metrics.total_response_time_ms as f64 / metrics.operation_count as f64
        } else {
            0.0
        };

        RepositoryStats {
            cache_hits: metrics.cache_hits,
            cache_misses: metrics.cache_misses,
            upstream_fetches: metrics.upstream_fetches,
            fetch_failures: metrics.fetch_failures,
            preference_saves: metrics.preference_saves,
            avg_response_time_ms,
        }
    }
}

/// Repository factory for easy creation with different backends
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// In-memory preferences and cache around any news source.
    pub fn memory(source: Arc<dyn NewsSource>, page_size: usize) -> NewsRepository {
        NewsRepository::new(
            Arc::new(MemoryPreferenceStore::new()),
            Arc::new(NewsCache::default()),
            source,
            page_size,
        )
    }

    /// File-backed preferences, optionally persisted cache and the HTTP client.
    pub fn from_config(config: &Config) -> Result<NewsRepository> {
        let activity = ActivityLogger::new(config.activity_log_dir()?)
            .with_timestamps(config.logging.activity_timestamps);
        let client = NewsClient::new(&config.api, activity)?;

        let preferences = FilePreferenceStore::open(config.data_dir()?)?;

        let cache_config = CacheConfig {
            max_entries: config.cache.max_entries,
            default_ttl: config.cache.ttl(),
        };
        let cache = if config.cache.persist {
            NewsCache::with_persistence(
                cache_config,
                PersistentCacheConfig {
                    cache_dir: config.cache_dir()?,
                    ..Default::default()
                },
            )?
        } else {
            NewsCache::new(cache_config)
        };

        Ok(NewsRepository::new(
            Arc::new(preferences),
            Arc::new(cache),
            Arc::new(client),
            config.api.page_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every request and replays a fixed outcome.
    struct StubSource {
        calls: AtomicUsize,
        seen: Mutex<Vec<UserPreferences>>,
        outcome: Mutex<std::result::Result<Vec<ArticleRecord>, FetchError>>,
    }

    impl StubSource {
        fn returning(outcome: std::result::Result<Vec<ArticleRecord>, FetchError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                outcome: Mutex::new(outcome),
            })
        }

        fn set_outcome(&self, outcome: std::result::Result<Vec<ArticleRecord>, FetchError>) {
            *self.outcome.lock() = outcome;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NewsSource for StubSource {
        async fn fetch(&self, preferences: &UserPreferences) -> std::result::Result<Vec<ArticleRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(preferences.clone());
            self.outcome.lock().clone()
        }
    }

    /// Counts writes reaching the real cache.
    #[derive(Default)]
    struct CountingCache {
        inner: NewsCache,
        puts: AtomicUsize,
    }

    impl ArticleCache for CountingCache {
        fn get(&self, user_id: &str) -> Option<ArticleList> {
            self.inner.get(user_id)
        }

        fn put(&self, user_id: &str, articles: ArticleList) -> Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(user_id, articles)
        }

        fn invalidate(&self, user_id: &str) -> Result<bool> {
            self.inner.invalidate(user_id)
        }
    }

    impl PreferenceListener for CountingCache {
        fn preferences_saved(&self, user_id: &str) {
            self.inner.preferences_saved(user_id);
        }
    }

    fn articles(count: usize) -> Vec<ArticleRecord> {
        (0..count)
            .map(|i| ArticleRecord::new(format!("Story {}", i), format!("https://news.test/{}", i)))
            .collect()
    }

    fn repository(source: Arc<StubSource>) -> (NewsRepository, Arc<CountingCache>) {
        let cache = Arc::new(CountingCache::default());
        let repo = NewsRepository::new(
            Arc::new(MemoryPreferenceStore::new()),
            cache.clone(),
            source,
            5,
        );
        (repo, cache)
    }

    #[tokio::test]
    async fn test_miss_fetches_and_puts_once() {
        let source = StubSource::returning(Ok(articles(23)));
        let (repo, cache) = repository(source.clone());

        let result = repo.get_articles_for_user("42").await.unwrap().unwrap();
        assert_eq!(result.len(), 23);
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hit_skips_upstream() {
        let source = StubSource::returning(Ok(articles(3)));
        let (repo, cache) = repository(source.clone());

        repo.get_articles_for_user("42").await.unwrap();
        for _ in 0..5 {
            let cached = repo.get_articles_for_user("42").await.unwrap().unwrap();
            assert_eq!(cached.len(), 3);
        }

        assert_eq!(source.calls(), 1);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 1);

        let stats = repo.stats();
        assert_eq!(stats.cache_hits, 5);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.upstream_fetches, 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let source = StubSource::returning(Err(FetchError::Http {
            status: 401,
            message: "invalid key".to_string(),
        }));
        let (repo, cache) = repository(source.clone());

        assert!(repo.get_articles_for_user("42").await.unwrap().is_none());
        assert_eq!(cache.puts.load(Ordering::SeqCst), 0);
        assert!(cache.get("42").is_none());

        // the next view retries and heals
        source.set_outcome(Ok(articles(2)));
        let healed = repo.get_articles_for_user("42").await.unwrap().unwrap();
        assert_eq!(healed.len(), 2);
        assert_eq!(source.calls(), 2);
        assert_eq!(repo.stats().fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_absent() {
        let source = StubSource::returning(Err(FetchError::EmptyResult { status: 200 }));
        let (repo, cache) = repository(source);

        assert!(repo.get_articles_for_user("42").await.unwrap().is_none());
        assert_eq!(cache.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_snapshot_write_failure_still_returns_articles() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = NewsCache::with_persistence(
            CacheConfig::default(),
            PersistentCacheConfig {
                cache_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("news_cache.tmp")).unwrap();

        let source = StubSource::returning(Ok(articles(3)));
        let repo = NewsRepository::new(
            Arc::new(MemoryPreferenceStore::new()),
            Arc::new(cache),
            source.clone(),
            5,
        );

        let fetched = repo.get_articles_for_user("1").await.unwrap().unwrap();
        assert_eq!(fetched.len(), 3);

        let cached = repo.get_articles_for_user("1").await.unwrap().unwrap();
        assert_eq!(cached.len(), 3);
        assert_eq!(source.calls(), 1);
        assert_eq!(repo.stats().fetch_failures, 0);
    }

    #[tokio::test]
    async fn test_absent_preferences_use_empty_filters() {
        let source = StubSource::returning(Ok(articles(1)));
        let (repo, _) = repository(source.clone());

        repo.get_articles_for_user("42").await.unwrap();
        assert_eq!(source.seen.lock()[0], UserPreferences::empty("42"));
    }

    #[tokio::test]
    async fn test_saving_preferences_invalidates_cache() {
        let source = StubSource::returning(Ok(articles(3)));
        let (repo, _) = repository(source.clone());

        repo.get_articles_for_user("42").await.unwrap();
        repo.save_preferences("42", "sports", "", "2024-01-01", "2024-01-08")
            .await
            .unwrap();

        source.set_outcome(Ok(articles(7)));
        let refreshed = repo.get_articles_for_user("42").await.unwrap().unwrap();
        assert_eq!(refreshed.len(), 7);
        assert_eq!(source.calls(), 2);

        let seen = source.seen.lock();
        assert_eq!(seen[1].interest, "sports");
        assert_eq!(seen[1].date_to, "2024-01-08");
    }

    #[tokio::test]
    async fn test_save_leaves_other_users_cached() {
        let source = StubSource::returning(Ok(articles(3)));
        let (repo, _) = repository(source.clone());

        repo.get_articles_for_user("1").await.unwrap();
        repo.get_articles_for_user("2").await.unwrap();
        repo.save_preferences("1", "chess", "", "", "").await.unwrap();

        repo.get_articles_for_user("2").await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_extra_listener_is_notified() {
        struct Recorder(Mutex<Vec<String>>);
        impl PreferenceListener for Recorder {
            fn preferences_saved(&self, user_id: &str) {
                self.0.lock().push(user_id.to_string());
            }
        }

        let (mut repo, _) = repository(StubSource::returning(Ok(articles(1))));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        repo.add_listener(recorder.clone());

        repo.save_preferences("8", "f1", "", "", "").await.unwrap();
        assert_eq!(*recorder.0.lock(), vec!["8".to_string()]);
    }

    #[tokio::test]
    async fn test_paginate_for_user() {
        let (repo, _) = repository(StubSource::returning(Ok(articles(23))));

        assert!(matches!(
            repo.paginate_for_user("42", 1),
            Err(Error::NoCachedNews(_))
        ));

        repo.get_articles_for_user("42").await.unwrap();

        let page = repo.paginate_for_user("42", 5).unwrap();
        assert_eq!(page.total_pages, 5);
        assert_eq!(page.articles.len(), 3);
        assert_eq!(page.articles[0].title, "Story 20");

        assert!(matches!(
            repo.paginate_for_user("42", 6),
            Err(Error::EmptyPage { page: 6, total_pages: 5 })
        ));
    }

    #[tokio::test]
    async fn test_first_page() {
        let (repo, _) = repository(StubSource::returning(Ok(articles(7))));

        let page = repo.first_page("42").await.unwrap().unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.articles.len(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_requests_never_corrupt() {
        let source = StubSource::returning(Ok(articles(4)));
        let (repo, _) = repository(source.clone());

        let requests = (0..8).map(|_| repo.get_articles_for_user("42"));
        let results = futures::future::join_all(requests).await;

        for result in results {
            assert_eq!(result.unwrap().unwrap().len(), 4);
        }
        assert!(source.calls() >= 1);
        assert_eq!(repo.get_articles_for_user("42").await.unwrap().unwrap().len(), 4);
    }
}
