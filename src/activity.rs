use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::Local;
use tracing::{debug, warn};

use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only, per-customer log of news fetch activity.
///
/// Writes are best-effort: a failure is reported through `tracing` and never
/// interrupts the caller.
#[derive(Debug, Clone)]
pub struct ActivityLogger {
    log_dir: PathBuf,
    include_timestamp: bool,
}

impl ActivityLogger {
    pub fn new<P: Into<PathBuf>>(log_dir: P) -> Self {
        Self {
            log_dir: log_dir.into(),
            include_timestamp: true,
        }
    }

    pub fn with_timestamps(mut self, include_timestamp: bool) -> Self {
        self.include_timestamp = include_timestamp;
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// `<log_dir>/customer_preferred_news_<user_id>.log`
    ///
    /// The id is form-urlencoded, so distinct ids always get distinct files
    /// and path separators never reach the file system.
    pub fn log_path(&self, user_id: &str) -> PathBuf {
        let safe_id: String = url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect();
        self.log_dir.join(format!("customer_preferred_news_{}.log", safe_id))
    }

    pub fn write(&self, user_id: &str, message: &str) {
        if message.is_empty() {
            return;
        }

        let line = if self.include_timestamp {
            format!("{} :: {}\n", Local::now().format(TIMESTAMP_FORMAT), message)
        } else {
            format!("{}\n", message)
        };

        if let Err(e) = self.append(user_id, &line) {
            warn!("Failed to write activity log for user {}: {}", user_id, e);
        }
    }

    fn append(&self, user_id: &str, line: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        let path = self.log_path(user_id);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        debug!("Activity log {} <- {}", path.display(), line.trim_end());
        Ok(())
    }

    /// All lines logged so far for a user, oldest first.
    pub fn entries(&self, user_id: &str) -> Result<Vec<String>> {
        let path = self.log_path(user_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(content.lines().map(str::to_string).collect())
    }
}
