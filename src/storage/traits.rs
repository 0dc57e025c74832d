use async_trait::async_trait;

use crate::error::Result;
use crate::news::{ArticleList, UserPreferences};

/// Durable store of customer news preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Saved preferences, or `None` when nothing (or only empty fields) was saved.
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>>;

    /// Overwrite all four preference fields for `preferences.user_id`.
    async fn save(&self, preferences: &UserPreferences) -> Result<()>;

    /// Number of customers with a stored record.
    async fn len(&self) -> Result<usize>;
}

/// Per-customer, time-bounded article cache.
pub trait ArticleCache: Send + Sync {
    /// Cached list for a customer, `None` when never written or expired.
    fn get(&self, user_id: &str) -> Option<ArticleList>;

    /// Replace the customer's list with the default TTL.
    fn put(&self, user_id: &str, articles: ArticleList) -> Result<()>;

    /// Drop the customer's entry; returns whether one existed.
    fn invalidate(&self, user_id: &str) -> Result<bool>;
}

/// Receives preference-save events.
pub trait PreferenceListener: Send + Sync {
    fn preferences_saved(&self, user_id: &str);
}
