use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::news::{ArticleList, ArticleRecord};
use crate::storage::cache::CacheEntry;

/// Bumped whenever the on-disk layout changes; other versions are ignored.
pub const CACHE_VERSION: u32 = 1;

const CACHE_FILE_NAME: &str = "news_cache.json";

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Serializable version of CacheEntry for disk storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableCacheEntry<T> {
    pub data: T,
    pub created_at: u64,
    pub expires_at: u64,
    pub access_count: u64,
    pub last_accessed: u64,
}

impl From<&CacheEntry<ArticleList>> for SerializableCacheEntry<Vec<ArticleRecord>> {
    fn from(entry: &CacheEntry<ArticleList>) -> Self {
        Self {
            data: entry.data.as_ref().clone(),
            created_at: unix_secs(entry.created_at),
            expires_at: unix_secs(entry.expires_at),
            access_count: entry.access_count,
            last_accessed: unix_secs(entry.last_accessed),
        }
    }
}

impl From<SerializableCacheEntry<Vec<ArticleRecord>>> for CacheEntry<ArticleList> {
    fn from(entry: SerializableCacheEntry<Vec<ArticleRecord>>) -> Self {
        Self {
            data: Arc::new(entry.data),
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(entry.created_at),
            expires_at: SystemTime::UNIX_EPOCH + Duration::from_secs(entry.expires_at),
            access_count: entry.access_count,
            last_accessed: SystemTime::UNIX_EPOCH + Duration::from_secs(entry.last_accessed),
        }
    }
}

/// Snapshot of every customer's cached article list.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistentCacheData {
    pub cache_version: u32,
    pub saved_at: u64,
    pub entries: HashMap<String, SerializableCacheEntry<Vec<ArticleRecord>>>,
}

impl Default for PersistentCacheData {
    fn default() -> Self {
        Self {
            cache_version: CACHE_VERSION,
            saved_at: unix_secs(SystemTime::now()),
            entries: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersistentCacheConfig {
    pub cache_dir: PathBuf,
    pub max_size_mb: u64,
}

impl Default for PersistentCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("customer-news"),
            max_size_mb: 100,
        }
    }
}

/// Saves and loads the news cache to and from a JSON file.
pub struct PersistentCache {
    config: PersistentCacheConfig,
    cache_file: PathBuf,
}

impl PersistentCache {
    pub fn new(config: PersistentCacheConfig) -> Result<Self> {
        if !config.cache_dir.exists() {
            fs::create_dir_all(&config.cache_dir)
                .map_err(|e| Error::Storage(format!(
                    "Failed to create cache directory '{}': {}",
                    config.cache_dir.display(), e
                )))?;
        }

        let cache_file = config.cache_dir.join(CACHE_FILE_NAME);

        Ok(Self {
            config,
            cache_file,
        })
    }

    /// Load the snapshot, dropping expired entries.
    ///
    /// Returns `None` when there is no file, when it was written with another
    /// `CACHE_VERSION`, or when it cannot be decoded. An undecodable file is
    /// removed so the next save starts clean.
    pub fn load(&self) -> Result<Option<PersistentCacheData>> {
        if !self.cache_file.exists() {
            tracing::debug!("Cache file does not exist: {}", self.cache_file.display());
            return Ok(None);
        }

        let file_content = fs::read_to_string(&self.cache_file)
            .map_err(|e| Error::Storage(format!(
                "Failed to read cache file '{}': {}",
                self.cache_file.display(), e
            )))?;

        let value = match serde_json::from_str::<serde_json::Value>(&file_content) {
            Ok(value) => value,
            Err(e) => {
                self.discard(&e);
                return Ok(None);
            }
        };

        let version = value
            .get("cache_version")
            .and_then(serde_json::Value::as_u64);
        if version != Some(u64::from(CACHE_VERSION)) {
            tracing::info!(
                "Ignoring cache file {} with version {:?} (expected {})",
                self.cache_file.display(), version, CACHE_VERSION
            );
            return Ok(None);
        }

        let mut cache_data: PersistentCacheData = match serde_json::from_value(value) {
            Ok(data) => data,
            Err(e) => {
                self.discard(&e);
                return Ok(None);
            }
        };

        let now = unix_secs(SystemTime::now());
        cache_data.entries.retain(|_, entry| entry.expires_at > now);

        tracing::info!("Loaded cached news for {} customers", cache_data.entries.len());

        Ok(Some(cache_data))
    }

    fn discard(&self, reason: &serde_json::Error) {
        tracing::warn!(
            "Discarding unreadable cache file {}: {}",
            self.cache_file.display(), reason
        );
        if let Err(e) = fs::remove_file(&self.cache_file) {
            tracing::warn!("Failed to remove cache file {}: {}", self.cache_file.display(), e);
        }
    }

    pub fn save(&self, entries: &HashMap<String, CacheEntry<ArticleList>>) -> Result<()> {
        let cache_data = PersistentCacheData {
            entries: entries
                .iter()
                .filter(|(_, entry)| !entry.is_expired())
                .map(|(key, entry)| (key.clone(), SerializableCacheEntry::from(entry)))
                .collect(),
            ..Default::default()
        };

        let json_content = serde_json::to_string_pretty(&cache_data)?;

        // Write to temporary file first, then rename
        let temp_file = self.cache_file.with_extension("tmp");
        fs::write(&temp_file, json_content)
            .map_err(|e| Error::Storage(format!(
                "Failed to write cache to '{}': {}",
                temp_file.display(), e
            )))?;

        fs::rename(&temp_file, &self.cache_file)
            .map_err(|e| Error::Storage(format!(
                "Failed to rename cache file '{}' to '{}': {}",
                temp_file.display(), self.cache_file.display(), e
            )))?;

        tracing::debug!("Saved cached news for {} customers to {}",
                        cache_data.entries.len(), self.cache_file.display());

        Ok(())
    }

    pub fn cache_size_mb(&self) -> f64 {
        if let Ok(metadata) = fs::metadata(&self.cache_file) {
            metadata.len() as f64 / (1024.0 * 1024.0)
        } else {
            0.0
        }
    }

    /// Remove an oversized snapshot and stray temporary files.
    pub fn cleanup(&self) -> Result<()> {
        if self.cache_size_mb() > self.config.max_size_mb as f64 {
            tracing::warn!("Cache file size ({:.1} MB) exceeds limit ({} MB), removing cache",
                          self.cache_size_mb(), self.config.max_size_mb);
            if self.cache_file.exists() {
                fs::remove_file(&self.cache_file)
                    .map_err(|e| Error::Storage(format!(
                        "Failed to remove oversized cache file '{}': {}",
                        self.cache_file.display(), e
                    )))?
            }
        }

        if let Ok(entries) = fs::read_dir(&self.config.cache_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if name.ends_with(".tmp") {
                        let _ = fs::remove_file(entry.path());
                    }
                }
            }
        }

        Ok(())
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_file
    }
}
