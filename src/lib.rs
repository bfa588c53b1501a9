//! Quarry: a polite, anti-bot-aware web crawler
//!
//! Walks the hyperlink graph from a set of seed URLs within configured
//! boundaries, featuring:
//! - Asynchronous fetch scheduling with global and per-domain rate limits
//! - Probabilistic URL deduplication via a lock-free Bloom filter
//! - Anti-bot request shaping (user-agent/header rotation, cookie jar,
//!   referer tracking, randomized delays)
//! - Round-robin egress proxy rotation
//! - Pluggable page stores (JSON file, document index)
//! - A supervisor owning named crawler instances with bulk start/stop

pub mod config;
pub mod crawler;
pub mod metrics;
pub mod server;
pub mod storage;
pub mod types;
pub mod util;

pub use config::{AntiBotConfig, CrawlConfig};
pub use crawler::{Crawler, CrawlerSupervisor};
pub use storage::PageStore;
pub use types::PageRecord;
