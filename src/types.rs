//! Core data types shared across the crawler and the page stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A crawled page as persisted by a [`crate::storage::PageStore`].
///
/// Identity is the canonical absolute `url`. Timestamps are managed by the
/// store on upsert: `created_at` is preserved from the first insert,
/// `updated_at` reflects the most recent save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Canonical absolute URL (keyed identity)
    pub url: String,
    /// First non-empty of `<title>`, `<h1>`
    #[serde(default)]
    pub title: String,
    /// First non-empty of meta description, first `<p>`; truncated
    #[serde(default)]
    pub snippet: String,
    /// Raw response body, present only when full-content capture is enabled
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub full_content: String,
    /// First-insert time, preserved across upserts
    pub created_at: DateTime<Utc>,
    /// Most recent save time
    pub updated_at: DateTime<Utc>,
}

impl PageRecord {
    /// Create an empty record for a URL with both timestamps set to now.
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            title: String::new(),
            snippet: String::new(),
            full_content: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A pending fetch: the URL, its hop distance from the seed, and the page
/// that linked to it (used for the Referer header).
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub url: Url,
    pub depth: usize,
    pub referer: Option<String>,
}

impl WorkItem {
    /// A seed item at depth zero with no originator.
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            referer: None,
        }
    }
}

/// Lifecycle state of a crawler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Idle,
    Running,
    Stopping,
    Stopped,
}
