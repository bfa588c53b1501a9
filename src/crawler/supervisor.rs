//! Supervisor owning named crawler instances

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::instance::Crawler;

/// Registry of crawler instances keyed by caller-chosen IDs, with bulk
/// operations. All operations are safe under concurrent access.
#[derive(Default)]
pub struct CrawlerSupervisor {
    crawlers: RwLock<HashMap<String, Arc<Crawler>>>,
}

impl CrawlerSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under an ID, replacing any previous entry.
    pub fn add(&self, id: impl Into<String>, crawler: Arc<Crawler>) {
        self.crawlers.write().insert(id.into(), crawler);
    }

    /// Look up an instance by ID.
    pub fn get(&self, id: &str) -> Option<Arc<Crawler>> {
        self.crawlers.read().get(id).cloned()
    }

    /// Remove an instance, stopping it first if it is running.
    pub async fn remove(&self, id: &str) {
        if let Some(crawler) = self.get(id) {
            if crawler.is_running() {
                crawler.stop().await;
            }
        }
        self.crawlers.write().remove(id);
    }

    /// Start an instance by ID. Returns false when the ID is unknown.
    pub fn start(&self, id: &str) -> bool {
        match self.get(id) {
            Some(crawler) => {
                crawler.start();
                true
            }
            None => false,
        }
    }

    /// Stop an instance by ID. Returns false when the ID is unknown.
    pub async fn stop(&self, id: &str) -> bool {
        match self.get(id) {
            Some(crawler) => {
                crawler.stop().await;
                true
            }
            None => false,
        }
    }

    /// `(running, exists)` for an ID.
    pub fn status(&self, id: &str) -> (bool, bool) {
        match self.get(id) {
            Some(crawler) => (crawler.is_running(), true),
            None => (false, false),
        }
    }

    /// All registered IDs.
    pub fn all_ids(&self) -> Vec<String> {
        self.crawlers.read().keys().cloned().collect()
    }

    /// Stop every running instance. The running set is snapshotted under
    /// the read lock, the lock released, then each instance is joined.
    pub async fn stop_all(&self) {
        let running: Vec<Arc<Crawler>> = {
            let crawlers = self.crawlers.read();
            crawlers
                .values()
                .filter(|c| c.is_running())
                .cloned()
                .collect()
        };

        for crawler in running {
            crawler.stop().await;
        }
    }
}
