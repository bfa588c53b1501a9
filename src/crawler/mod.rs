//! Crawling engine
//!
//! Key components:
//! - `VisitedSet`: lock-free Bloom filter for URL deduplication
//! - `RequestShaper`: anti-bot request decoration and delay jitter
//! - `ProxyRotator`: round-robin egress proxy selection
//! - `RateLimiter`: global and per-domain admission control
//! - `RobotsGate`: robots.txt fetching, parsing and caching
//! - `UrlFilter`: allow/deny policy for discovered links
//! - `Crawler`: one crawl instance (lifecycle, worker pool, pipeline)
//! - `CrawlerSupervisor`: named registry of instances

pub mod antibot;
pub mod bloom;
pub mod extract;
pub mod filter;
pub mod instance;
pub mod limiter;
pub mod proxy;
pub mod robots;
pub mod supervisor;

pub use antibot::{random_delay, RequestShaper};
pub use bloom::VisitedSet;
pub use filter::UrlFilter;
pub use instance::{CrawlError, Crawler};
pub use limiter::{RateLimiter, RateRule};
pub use proxy::ProxyRotator;
pub use robots::RobotsGate;
pub use supervisor::CrawlerSupervisor;
