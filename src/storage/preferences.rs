use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::news::UserPreferences;
use crate::storage::traits::PreferenceStore;

const PREFERENCES_FILE_NAME: &str = "preferences.json";
const PREFERENCES_VERSION: u32 = 1;

/// Memory-only preference store for tests and embedding
#[derive(Default)]
pub struct MemoryPreferenceStore {
    records: RwLock<HashMap<String, UserPreferences>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        let records = self.records.read();
        Ok(records.get(user_id).cloned().and_then(UserPreferences::into_present))
    }

    async fn save(&self, preferences: &UserPreferences) -> Result<()> {
        let mut records = self.records.write();
        records.insert(preferences.user_id.clone(), preferences.clone());
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesDocument {
    version: u32,
    customers: BTreeMap<String, UserPreferences>,
}

/// Preference store kept in a single JSON document.
///
/// The whole document is rewritten on every save through a temporary file
/// and a rename, so readers never observe a partial write.
pub struct FilePreferenceStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, UserPreferences>>,
}

impl FilePreferenceStore {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .map_err(|e| Error::Storage(format!(
                "Failed to create data directory '{}': {}",
                data_dir.display(), e
            )))?;

        let path = data_dir.join(PREFERENCES_FILE_NAME);
        let records = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let document: PreferencesDocument = serde_json::from_str(&content)?;
            if document.version != PREFERENCES_VERSION {
                return Err(Error::Storage(format!(
                    "Unsupported preferences file version {} in '{}'",
                    document.version, path.display()
                )));
            }
            document.customers
        } else {
            BTreeMap::new()
        };

        debug!("Loaded preferences for {} customers from {}", records.len(), path.display());

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, customers: &BTreeMap<String, UserPreferences>) -> Result<()> {
        let document = PreferencesDocument {
            version: PREFERENCES_VERSION,
            customers: customers.clone(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        let temp_file = self.path.with_extension("tmp");
        fs::write(&temp_file, content)
            .map_err(|e| Error::Storage(format!(
                "Failed to write preferences to '{}': {}",
                temp_file.display(), e
            )))?;
        fs::rename(&temp_file, &self.path)
            .map_err(|e| Error::Storage(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_file.display(), self.path.display(), e
            )))?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        let records = self.records.read();
        Ok(records.get(user_id).cloned().and_then(UserPreferences::into_present))
    }

    async fn save(&self, preferences: &UserPreferences) -> Result<()> {
        let mut records = self.records.write();
        let previous = records.insert(preferences.user_id.clone(), preferences.clone());

        if let Err(e) = self.write_document(&records) {
            // keep memory and disk in step
            match previous {
                Some(old) => records.insert(preferences.user_id.clone(), old),
                None => records.remove(&preferences.user_id),
            };
            return Err(e);
        }

        debug!("Saved preferences for user {}", preferences.user_id);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}
