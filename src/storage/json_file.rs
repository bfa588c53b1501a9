//! File-backed page store
//!
//! The whole collection is kept as a pretty-printed JSON array and
//! re-serialized on every write. A single mutex makes every operation
//! exclusive, so upserts are atomic with respect to a URL.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{merge_for_upsert, PageStore, StoreError};
use crate::types::PageRecord;

pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Seed the file with an empty array when it does not exist yet.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        tokio::fs::write(&self.path, "[]").await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<PageRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, pages: &[PageRecord]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(pages)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl PageStore for JsonFileStore {
    async fn get_page(&self, url: &str) -> Result<Option<PageRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let pages = self.read_all().await?;
        Ok(pages.into_iter().find(|p| p.url == url))
    }

    async fn save_page(&self, record: PageRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut pages = self.read_all().await?;

        match pages.iter_mut().find(|p| p.url == record.url) {
            Some(existing) => {
                *existing = merge_for_upsert(record, Some(&*existing));
            }
            None => {
                pages.push(merge_for_upsert(record, None));
            }
        }

        self.write_all(&pages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("pages.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_initialize_seeds_empty_array() {
        let (_dir, store) = store();
        store.initialize().await.unwrap();

        let content = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(content, "[]");
    }

    #[tokio::test]
    async fn test_get_missing_page_is_none() {
        let (_dir, store) = store();
        store.initialize().await.unwrap();

        let page = store.get_page("https://example.com/").await.unwrap();
        assert!(page.is_none());
    }

    #[tokio::test]
    async fn test_save_and_get_roundtrip() {
        let (_dir, store) = store();
        store.initialize().await.unwrap();

        let mut record = PageRecord::new("https://example.com/a");
        record.title = "A".to_string();
        store.save_page(record).await.unwrap();

        let loaded = store
            .get_page("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.title, "A");
    }

    #[tokio::test]
    async fn test_upsert_preserves_full_content_and_created_at() {
        let (_dir, store) = store();
        store.initialize().await.unwrap();

        let mut first = PageRecord::new("https://example.com/a");
        first.full_content = "HELLO".to_string();
        store.save_page(first).await.unwrap();

        let created = store
            .get_page("https://example.com/a")
            .await
            .unwrap()
            .unwrap()
            .created_at;

        // Second save without full content must not clobber it
        let mut second = PageRecord::new("https://example.com/a");
        second.title = "Updated".to_string();
        store.save_page(second).await.unwrap();

        let loaded = store
            .get_page("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.full_content, "HELLO");
        assert_eq!(loaded.title, "Updated");
        assert_eq!(loaded.created_at, created);
        assert!(loaded.updated_at >= created);
    }

    #[tokio::test]
    async fn test_file_is_pretty_printed_array() {
        let (_dir, store) = store();
        store.initialize().await.unwrap();
        store
            .save_page(PageRecord::new("https://example.com/a"))
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert!(content.starts_with("[\n"));
        assert!(content.contains("  {"));
        assert!(content.contains("\"url\": \"https://example.com/a\""));
    }
}
