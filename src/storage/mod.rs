//! Pluggable page stores
//!
//! The crawler core only depends on the [`PageStore`] contract: read a
//! record by URL, upsert a record by URL. Two reference adapters are
//! provided: a whole-collection JSON file and a document index reached
//! over HTTP.

mod doc_index;
mod json_file;

pub use doc_index::{DocIndexStore, DEFAULT_INITIAL_BACKOFF, DEFAULT_READY_RETRIES};
pub use json_file::JsonFileStore;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::types::PageRecord;

/// Errors surfaced by page stores. The crawl never aborts on these; they
/// are logged and counted.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Contract for persisting and retrieving page records, keyed by URL.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Read a record by URL. A missing record is not an error.
    async fn get_page(&self, url: &str) -> Result<Option<PageRecord>, StoreError>;

    /// Upsert by URL. Implementations preserve `created_at` from a prior
    /// record, set `updated_at` to now, and never overwrite a non-empty
    /// `full_content` with an empty one.
    async fn save_page(&self, record: PageRecord) -> Result<(), StoreError>;
}

/// Apply the shared upsert rules: keep the original creation time, refresh
/// the update time, and retain existing full content when the incoming
/// record has none.
pub(crate) fn merge_for_upsert(mut incoming: PageRecord, existing: Option<&PageRecord>) -> PageRecord {
    let now = Utc::now();
    if let Some(existing) = existing {
        if incoming.full_content.is_empty() && !existing.full_content.is_empty() {
            incoming.full_content = existing.full_content.clone();
        }
        incoming.created_at = existing.created_at;
    } else {
        incoming.created_at = now;
    }
    incoming.updated_at = now;
    incoming
}
