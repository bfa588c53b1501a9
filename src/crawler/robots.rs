//! robots.txt fetching, parsing and caching
//!
//! Policies are cached per authority with a TTL; a failed fetch caches an
//! allow-all policy with a shorter TTL so unreachable hosts are retried.
//! Pattern matching supports `*` wildcards and `$` end anchors; the longest
//! matching pattern wins, with allow beating disallow on ties.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;
use url::Url;

const ROBOTS_CACHE_SIZE: usize = 1000;
const ROBOTS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const FAILED_FETCH_TTL: Duration = Duration::from_secs(60 * 60);

/// Parsed robots.txt rules for one host, as they apply to our user agent.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    disallow: Vec<String>,
    allow: Vec<String>,
    fetched_at: Instant,
    ttl: Duration,
}

impl RobotsPolicy {
    /// Parse robots.txt content, keeping the rule group that applies to
    /// `user_agent`. A group naming our agent overrides the wildcard group.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let ua_lower = user_agent.to_lowercase();
        let mut disallow = Vec::new();
        let mut allow = Vec::new();
        let mut applies = false;
        let mut found_specific = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_lowercase().as_str() {
                "user-agent" => {
                    let agent = value.to_lowercase();
                    if agent == "*" {
                        applies = !found_specific;
                    } else if ua_lower.contains(&agent) || agent.contains(&ua_lower) {
                        applies = true;
                        found_specific = true;
                        // Specific group replaces wildcard rules
                        disallow.clear();
                        allow.clear();
                    } else {
                        applies = false;
                    }
                }
                "disallow" if applies && !value.is_empty() => {
                    disallow.push(value.to_string());
                }
                "allow" if applies && !value.is_empty() => {
                    allow.push(value.to_string());
                }
                _ => {}
            }
        }

        Self {
            disallow,
            allow,
            fetched_at: Instant::now(),
            ttl: ROBOTS_TTL,
        }
    }

    /// Allow-all policy used when robots.txt cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            disallow: Vec::new(),
            allow: Vec::new(),
            fetched_at: Instant::now(),
            ttl: FAILED_FETCH_TTL,
        }
    }

    /// Whether a path is fetchable under this policy.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest_allow = self
            .allow
            .iter()
            .filter(|p| Self::path_matches(path, p))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        let longest_disallow = self
            .disallow
            .iter()
            .filter(|p| Self::path_matches(path, p))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);

        longest_allow >= longest_disallow
    }

    fn is_valid(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }

    fn path_matches(path: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }

        let (pattern, anchored) = match pattern.strip_suffix('$') {
            Some(p) => (p, true),
            None => (pattern, false),
        };

        if pattern.contains('*') {
            let mut pos = 0;
            for (i, part) in pattern.split('*').enumerate() {
                if part.is_empty() {
                    continue;
                }
                match path[pos..].find(part) {
                    Some(found) => {
                        if i == 0 && found != 0 {
                            return false;
                        }
                        pos += found + part.len();
                    }
                    None => return false,
                }
            }
            return !anchored || pos == path.len();
        }

        if anchored {
            path == pattern
        } else {
            path.starts_with(pattern)
        }
    }
}

/// Cache of per-host robots policies with on-demand fetching.
pub struct RobotsGate {
    cache: Mutex<LruCache<String, RobotsPolicy>>,
    client: reqwest::Client,
    user_agent: String,
}

impl RobotsGate {
    pub fn new(client: reqwest::Client, user_agent: String) -> Self {
        let capacity = NonZeroUsize::new(ROBOTS_CACHE_SIZE).expect("cache size is non-zero");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            client,
            user_agent,
        }
    }

    /// Whether the URL is fetchable according to its host's robots policy.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let key = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        {
            let mut cache = self.cache.lock().await;
            if let Some(policy) = cache.get(&key) {
                if policy.is_valid() {
                    return policy.is_allowed(url.path());
                }
            }
        }

        let policy = self.fetch_policy(url).await;
        let allowed = policy.is_allowed(url.path());
        self.cache.lock().await.put(key, policy);
        allowed
    }

    async fn fetch_policy(&self, url: &Url) -> RobotsPolicy {
        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        match self.client.get(robots_url.clone()).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(content) => RobotsPolicy::parse(&content, &self.user_agent),
                Err(e) => {
                    tracing::debug!(url = %robots_url, error = %e, "Failed to read robots.txt body");
                    RobotsPolicy::allow_all()
                }
            },
            // Missing robots.txt means everything is fetchable
            Ok(_) => RobotsPolicy::allow_all(),
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "Failed to fetch robots.txt");
                RobotsPolicy::allow_all()
            }
        }
    }
}
