//! Document-index page store
//!
//! Talks to an Elasticsearch-compatible backend over its REST API. The
//! document identifier is the lowercase hex MD5 digest of the URL, so
//! upserts are deterministic read-modify-write cycles against one ID.

use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::Deserialize;
use serde_json::json;

use super::{merge_for_upsert, PageStore, StoreError};
use crate::types::PageRecord;

/// Readiness probe defaults: ~2s initial backoff, multiplier 1.5.
pub const DEFAULT_READY_RETRIES: usize = 10;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);

pub struct DocIndexStore {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

#[derive(Debug, Deserialize)]
struct GetDocResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<PageRecord>,
}

impl DocIndexStore {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
        }
    }

    /// Block until the backend answers, then create the index if missing.
    pub async fn initialize(
        &self,
        max_retries: usize,
        initial_backoff: Duration,
    ) -> Result<(), StoreError> {
        self.wait_for_ready(max_retries, initial_backoff).await?;
        self.ensure_index().await
    }

    /// Deterministic document ID for a URL.
    fn doc_id(url: &str) -> String {
        hex::encode(Md5::digest(url.as_bytes()))
    }

    fn doc_url(&self, url: &str) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, Self::doc_id(url))
    }

    async fn wait_for_ready(
        &self,
        max_retries: usize,
        initial_backoff: Duration,
    ) -> Result<(), StoreError> {
        let mut backoff = initial_backoff;

        for attempt in 1..=max_retries {
            match self.client.get(&self.base_url).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(attempts = attempt, "Connected to document index");
                    return Ok(());
                }
                Ok(response) => {
                    tracing::warn!(
                        attempt,
                        max_retries,
                        status = %response.status(),
                        "Document index not ready"
                    );
                }
                Err(e) => {
                    tracing::warn!(attempt, max_retries, error = %e, "Document index not ready");
                }
            }

            if attempt < max_retries {
                tokio::time::sleep(backoff).await;
                backoff = backoff.mul_f64(1.5);
            }
        }

        Err(StoreError::Backend(format!(
            "document index not reachable after {} attempts",
            max_retries
        )))
    }

    /// Create the index with its mapping unless it already exists.
    async fn ensure_index(&self) -> Result<(), StoreError> {
        let index_url = format!("{}/{}", self.base_url, self.index);

        let head = self.client.head(&index_url).send().await?;
        if head.status().is_success() {
            tracing::info!(index = %self.index, "Document index already exists");
            return Ok(());
        }

        let mapping = json!({
            "mappings": {
                "properties": {
                    "url": { "type": "keyword" },
                    "title": { "type": "text", "analyzer": "standard" },
                    "snippet": { "type": "text", "analyzer": "standard" },
                    "full_content": { "type": "text", "analyzer": "standard" },
                    "created_at": { "type": "date" },
                    "updated_at": { "type": "date" }
                }
            }
        });

        let response = self.client.put(&index_url).json(&mapping).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "failed to create index {}: {}",
                self.index,
                response.status()
            )));
        }

        tracing::info!(index = %self.index, "Created document index");
        Ok(())
    }
}

#[async_trait]
impl PageStore for DocIndexStore {
    async fn get_page(&self, url: &str) -> Result<Option<PageRecord>, StoreError> {
        let response = self.client.get(self.doc_url(url)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "get failed for {}: {}",
                url,
                response.status()
            )));
        }

        let doc: GetDocResponse = response.json().await?;
        if !doc.found {
            return Ok(None);
        }
        Ok(doc.source)
    }

    async fn save_page(&self, record: PageRecord) -> Result<(), StoreError> {
        let existing = self.get_page(&record.url).await?;
        let merged = merge_for_upsert(record, existing.as_ref());

        let response = self
            .client
            .put(format!("{}?refresh=true", self.doc_url(&merged.url)))
            .json(&merged)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "index failed for {}: {}",
                merged.url,
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_doc_id_is_lowercase_hex_md5() {
        // Known MD5 test vector
        assert_eq!(DocIndexStore::doc_id("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[tokio::test]
    async fn test_initialize_retries_until_ready() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/pages"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = DocIndexStore::new(server.uri(), "pages");
        store
            .initialize(5, Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initialize_creates_missing_index() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/pages"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/pages"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = DocIndexStore::new(server.uri(), "pages");
        store
            .initialize(1, Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_missing_page_is_none() {
        let server = MockServer::start().await;
        let doc_path = format!("/pages/_doc/{}", DocIndexStore::doc_id("https://example.com/"));

        Mock::given(method("GET"))
            .and(path(doc_path))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = DocIndexStore::new(server.uri(), "pages");
        let page = store.get_page("https://example.com/").await.unwrap();
        assert!(page.is_none());
    }

    #[tokio::test]
    async fn test_save_reads_then_indexes_with_refresh() {
        let server = MockServer::start().await;
        let doc_path = format!("/pages/_doc/{}", DocIndexStore::doc_id("https://example.com/"));

        Mock::given(method("GET"))
            .and(path(doc_path.clone()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(doc_path))
            .and(query_param("refresh", "true"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = DocIndexStore::new(server.uri(), "pages");
        store
            .save_page(PageRecord::new("https://example.com/"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_deserializes_source() {
        let server = MockServer::start().await;
        let doc_path = format!("/pages/_doc/{}", DocIndexStore::doc_id("https://example.com/"));

        let record = PageRecord::new("https://example.com/");
        let body = json!({ "found": true, "_source": record });

        Mock::given(method("GET"))
            .and(path(doc_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let store = DocIndexStore::new(server.uri(), "pages");
        let loaded = store.get_page("https://example.com/").await.unwrap().unwrap();
        assert_eq!(loaded.url, "https://example.com/");
    }
}
