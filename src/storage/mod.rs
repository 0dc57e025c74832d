pub mod cache;
pub mod persistent_cache;
pub mod preferences;
pub mod repository;
pub mod traits;

pub use cache::{cache_key, CacheConfig, CacheEntry, CacheStats, NewsCache, DEFAULT_TTL};
pub use persistent_cache::{PersistentCache, PersistentCacheConfig};
pub use preferences::{FilePreferenceStore, MemoryPreferenceStore};
pub use repository::{NewsPage, NewsRepository, RepositoryFactory, RepositoryStats};
pub use traits::{ArticleCache, PreferenceListener, PreferenceStore};
