//! Round-robin egress proxy rotation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use url::Url;

/// Rotates requests across an ordered list of proxy URIs.
///
/// With an empty list the rotator is disabled and requests use the
/// process's default egress.
pub struct ProxyRotator {
    proxies: Vec<Url>,
    cursor: AtomicUsize,
}

impl ProxyRotator {
    /// Parse the configured proxy list. Malformed entries are dropped with
    /// a warning; the crawl continues with whatever remains.
    pub fn new(entries: &[String]) -> Self {
        let proxies = entries
            .iter()
            .filter_map(|entry| match Url::parse(entry) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(proxy = %entry, error = %e, "Ignoring malformed proxy");
                    None
                }
            })
            .collect();

        Self {
            proxies,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Whether any proxies are configured.
    pub fn is_enabled(&self) -> bool {
        !self.proxies.is_empty()
    }

    /// The proxy the next request should use; advances the rotation.
    pub fn current(&self) -> Option<Url> {
        if self.proxies.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(self.proxies[idx].clone())
    }

    /// Install the rotator on a reqwest client builder. Each request asks
    /// the rotator for its proxy, which yields per-request round-robin.
    pub fn apply(self: &Arc<Self>, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        if !self.is_enabled() {
            return builder;
        }
        let rotator = Arc::clone(self);
        builder.proxy(reqwest::Proxy::custom(move |_url| rotator.current()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_disabled() {
        let rotator = ProxyRotator::new(&[]);
        assert!(!rotator.is_enabled());
        assert!(rotator.current().is_none());
    }

    #[test]
    fn test_round_robin_order() {
        let rotator = ProxyRotator::new(&[
            "http://proxy1:8080".to_string(),
            "http://proxy2:8080".to_string(),
        ]);

        let first = rotator.current().unwrap();
        let second = rotator.current().unwrap();
        let third = rotator.current().unwrap();

        assert_eq!(first.host_str(), Some("proxy1"));
        assert_eq!(second.host_str(), Some("proxy2"));
        assert_eq!(third.host_str(), Some("proxy1"));
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let rotator = ProxyRotator::new(&[
            "http://proxy1:8080".to_string(),
            "not a proxy".to_string(),
        ]);

        assert!(rotator.is_enabled());
        assert_eq!(rotator.proxies.len(), 1);
    }
}
