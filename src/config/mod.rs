//! Configuration for the crawler process
//!
//! Everything is driven by `CRAWLER_*` environment variables, read once at
//! startup. Only the seed URL is required; malformed optional values fall
//! back to their defaults with a warning.

mod logging;

pub use logging::init_logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Default user agent when rotation is disabled and none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

/// Anti-bot shaping policy. Each measure toggles independently.
#[derive(Debug, Clone)]
pub struct AntiBotConfig {
    pub user_agent_rotation: bool,
    pub header_randomization: bool,
    pub cookie_handling: bool,
    pub sophisticated_delays: bool,
    pub custom_user_agents: Vec<String>,
    pub custom_accept_languages: Vec<String>,
    /// Base delay the jitter multiplies
    pub base_delay: Duration,
    /// Jitter spread; 0.5-2.0 recommended
    pub random_delay_factor: f64,
}

impl Default for AntiBotConfig {
    fn default() -> Self {
        Self {
            user_agent_rotation: true,
            header_randomization: true,
            cookie_handling: true,
            sophisticated_delays: true,
            custom_user_agents: Vec::new(),
            custom_accept_languages: Vec::new(),
            base_delay: Duration::from_millis(200),
            random_delay_factor: 1.5,
        }
    }
}

/// Immutable per-instance crawl configuration.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Seed URL; must be absolute
    pub start_url: String,
    /// Hop limit from the seed; `None` means unlimited
    pub max_depth: Option<usize>,
    /// Per-instance visit cap; `None` means unlimited
    pub max_visits: Option<usize>,
    /// Global worker cap per instance
    pub parallel_requests: usize,
    /// Base spacing between requests against the same rate rule
    pub delay: Duration,
    /// Random spacing component on top of `delay`
    pub random_delay: Duration,
    /// Per-request wall-clock limit
    pub timeout: Duration,
    pub respect_robots_txt: bool,
    /// Strip query strings before dedup and request
    pub ignore_query_strings: bool,
    pub allowed_domains: Vec<String>,
    pub disallowed_domains: Vec<String>,
    pub allowed_urls: Vec<String>,
    pub disallowed_urls: Vec<String>,
    /// Fixed user agent when rotation is disabled
    pub user_agent: String,
    /// Fixed Accept-Language when header randomization is disabled
    pub accept_language: String,
    pub enable_full_content: bool,
    pub enable_metrics: bool,
    /// Egress proxy URIs, rotated round-robin
    pub proxies: Vec<String>,
    pub anti_bot: AntiBotConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            max_depth: Some(3),
            max_visits: Some(1000),
            parallel_requests: 10,
            delay: Duration::from_millis(50),
            random_delay: Duration::from_millis(50),
            timeout: Duration::from_secs(10),
            respect_robots_txt: true,
            ignore_query_strings: false,
            allowed_domains: Vec::new(),
            disallowed_domains: Vec::new(),
            allowed_urls: Vec::new(),
            disallowed_urls: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: String::new(),
            enable_full_content: false,
            enable_metrics: false,
            proxies: Vec::new(),
            anti_bot: AntiBotConfig::default(),
        }
    }
}

/// Which page store backs the process.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Whole-collection JSON file
    JsonFile { path: PathBuf },
    /// Document index over HTTP
    DocIndex { base_url: String, index: String },
}

/// Process-wide configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Template configuration shared by all instances
    pub crawl: CrawlConfig,
    /// One crawler instance is spawned per seed
    pub seeds: Vec<String>,
    pub storage: StorageBackend,
    /// Admin HTTP bind address
    pub http_addr: String,
}

impl AppConfig {
    /// Read the full configuration from `CRAWLER_*` environment variables.
    /// A missing `CRAWLER_START_URL` is fatal.
    pub fn from_env() -> Result<Self> {
        let start_url = match std::env::var("CRAWLER_START_URL") {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => anyhow::bail!("CRAWLER_START_URL environment variable is required"),
        };

        let anti_bot = AntiBotConfig {
            user_agent_rotation: env_bool("CRAWLER_ENABLE_USER_AGENT_ROTATION", true),
            header_randomization: env_bool("CRAWLER_ENABLE_HEADER_RANDOMIZATION", true),
            cookie_handling: env_bool("CRAWLER_ENABLE_COOKIE_HANDLING", true),
            sophisticated_delays: env_bool("CRAWLER_ENABLE_SOPHISTICATED_DELAYS", true),
            custom_user_agents: env_list("CRAWLER_CUSTOM_USER_AGENTS"),
            custom_accept_languages: env_list("CRAWLER_CUSTOM_ACCEPT_LANGUAGES"),
            base_delay: Duration::from_millis(env_parse("CRAWLER_DELAY_MS", 50)),
            random_delay_factor: env_parse("CRAWLER_RANDOM_DELAY_FACTOR", 1.5),
        };

        let crawl = CrawlConfig {
            start_url: start_url.clone(),
            max_depth: optional_limit(env_parse("CRAWLER_MAX_DEPTH", 3)),
            max_visits: optional_limit(env_parse("CRAWLER_MAX_VISITS", 1000)),
            parallel_requests: env_parse("CRAWLER_PARALLEL_REQUESTS", 10),
            delay: Duration::from_millis(env_parse("CRAWLER_DELAY_MS", 50)),
            random_delay: Duration::from_millis(env_parse("CRAWLER_RANDOM_DELAY_MS", 50)),
            timeout: Duration::from_secs(env_parse("CRAWLER_TIMEOUT_SEC", 10)),
            respect_robots_txt: env_bool("CRAWLER_RESPECT_ROBOTS_TXT", true),
            ignore_query_strings: env_bool("CRAWLER_IGNORE_QUERY_STRINGS", false),
            allowed_domains: env_list("CRAWLER_ALLOWED_DOMAINS"),
            disallowed_domains: env_list("CRAWLER_DISALLOWED_DOMAINS"),
            allowed_urls: env_list("CRAWLER_ALLOWED_URLS"),
            disallowed_urls: env_list("CRAWLER_DISALLOWED_URLS"),
            user_agent: env_or("CRAWLER_USER_AGENT", DEFAULT_USER_AGENT),
            accept_language: env_or("CRAWLER_ACCEPT_LANGUAGE", ""),
            enable_full_content: env_bool("CRAWLER_ENABLE_FULL_CONTENT", false),
            enable_metrics: env_bool("CRAWLER_ENABLE_METRICS", false),
            proxies: env_list("CRAWLER_PROXIES"),
            anti_bot,
        };

        let seeds = {
            let extra = env_list("CRAWLER_START_URLS");
            if extra.is_empty() {
                vec![start_url]
            } else {
                extra
            }
        };

        let storage = match env_or("CRAWLER_STORAGE", "json").as_str() {
            "index" => StorageBackend::DocIndex {
                base_url: env_or("CRAWLER_INDEX_URL", "http://localhost:9200"),
                index: env_or("CRAWLER_INDEX_NAME", "pages"),
            },
            other => {
                if other != "json" {
                    tracing::warn!(value = other, "Unknown CRAWLER_STORAGE, using json");
                }
                StorageBackend::JsonFile {
                    path: PathBuf::from(env_or("CRAWLER_OUTPUT_FILE", "crawled_data.json")),
                }
            }
        };

        Ok(Self {
            crawl,
            seeds,
            storage,
            http_addr: env_or("CRAWLER_HTTP_ADDR", "0.0.0.0:8080"),
        })
    }
}

/// Zero means "unlimited" for depth and visit caps.
fn optional_limit(value: usize) -> Option<usize> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = v.as_str(), "Could not parse value, using default");
            default
        }),
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_parse(key, default)
}

fn env_list(key: &str) -> Vec<String> {
    match std::env::var(key) {
        Ok(v) => v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}
