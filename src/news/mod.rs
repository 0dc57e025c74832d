pub mod client;
pub mod pager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub use client::{NewsClient, NewsQuery, NewsSource};
pub use pager::{paginate, total_pages, Page};

/// Full, unsliced article list as fetched for one customer.
pub type ArticleList = Arc<Vec<ArticleRecord>>;

/// A customer's saved news filters.
///
/// Every field is free text; an empty string means "no filter".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    #[serde(default)]
    pub interest: String,
    #[serde(default)]
    pub domains: String,
    #[serde(default)]
    pub date_from: String,
    #[serde(default)]
    pub date_to: String,
}

impl UserPreferences {
    pub fn new(
        user_id: impl Into<String>,
        interest: impl Into<String>,
        domains: impl Into<String>,
        date_from: impl Into<String>,
        date_to: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            interest: interest.into(),
            domains: domains.into(),
            date_from: date_from.into(),
            date_to: date_to.into(),
        }
    }

    /// Preferences with every filter unset.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self::new(user_id, "", "", "", "")
    }

    /// True when all four filters are empty.
    pub fn is_empty(&self) -> bool {
        self.interest.is_empty()
            && self.domains.is_empty()
            && self.date_from.is_empty()
            && self.date_to.is_empty()
    }

    /// Collapses an all-empty preference set to `None`.
    pub fn into_present(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// One article as returned by the upstream API.
///
/// The known fields are lifted out; everything else the upstream sends
/// (`source`, `author`, `content`, ...) is kept verbatim in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,

    #[serde(rename = "urlToImage", default)]
    pub url_to_image: Option<String>,

    #[serde(rename = "publishedAt", default)]
    pub published_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ArticleRecord {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            url: url.into(),
            url_to_image: None,
            published_at: None,
            extra: Map::new(),
        }
    }

    /// Publication time, when the upstream value is RFC 3339.
    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    /// Name of the publishing source, if the upstream sent one.
    pub fn source_name(&self) -> Option<&str> {
        self.extra
            .get("source")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
    }

    /// Plain-text rendering used by the CLI.
    pub fn to_text(&self) -> String {
        let mut text = String::new();

        text.push_str(&format!("Title: {}\n", self.title));

        if let Some(source) = self.source_name() {
            text.push_str(&format!("Source: {}\n", source));
        }

        if let Some(published) = self.published() {
            text.push_str(&format!("Published: {}\n", published.format("%Y-%m-%d %H:%M:%S UTC")));
        } else if let Some(raw) = &self.published_at {
            text.push_str(&format!("Published: {}\n", raw));
        }

        text.push_str(&format!("Link: {}\n", self.url));

        if let Some(description) = &self.description {
            text.push('\n');
            text.push_str(description);
            text.push('\n');
        }

        text
    }
}
