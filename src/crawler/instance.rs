//! A single crawler instance
//!
//! Owns the work queue, the worker pool and every shared resource of one
//! crawl: HTTP client, cookie jar, proxy rotator, rate limiter, robots
//! cache and the visited-URL filter. The fetch → extract → persist →
//! discover path runs as an explicit pipeline per work item.
//!
//! Lifecycle: `Idle → Running` on start, `Running → Stopping` on stop or
//! when the visit cap is hit, `Stopping → Stopped` once all in-flight
//! workers drain. Invalid transitions warn and do nothing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use url::Url;

use crate::config::CrawlConfig;
use crate::crawler::{
    antibot::{self, RequestShaper},
    bloom::VisitedSet,
    extract,
    filter::{self, UrlFilter},
    limiter::RateLimiter,
    proxy::ProxyRotator,
    robots::RobotsGate,
};
use crate::metrics::CrawlerMetrics;
use crate::storage::PageStore;
use crate::types::{InstanceState, PageRecord, WorkItem};

/// How long the scheduler naps when the queue is empty but workers are
/// still in flight.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bloom filter sizing floor; below this false positives get noticeable.
const MIN_EXPECTED_URLS: usize = 10_000;

/// Target false-positive rate for the visited set.
const VISITED_FP_RATE: f64 = 0.01;

/// Errors raised while constructing an instance. Everything after
/// construction is logged and counted instead of propagated.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid seed URL '{url}': {source}")]
    InvalidSeed {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// One running crawl rooted at a seed URL.
pub struct Crawler {
    config: CrawlConfig,
    seed_url: Url,
    state: RwLock<InstanceState>,
    client: reqwest::Client,
    shaper: RequestShaper,
    limiter: RateLimiter,
    robots: RobotsGate,
    url_filter: UrlFilter,
    visited: VisitedSet,
    store: Arc<dyn PageStore>,
    metrics: Option<Arc<CrawlerMetrics>>,
    queue: Mutex<VecDeque<WorkItem>>,
    visit_count: AtomicUsize,
    shutdown: watch::Sender<bool>,
    scheduler: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Crawler {
    /// Construct an instance in the `Idle` state. Does not touch the
    /// network.
    pub fn new(
        config: CrawlConfig,
        store: Arc<dyn PageStore>,
        metrics: Option<Arc<CrawlerMetrics>>,
    ) -> Result<Self, CrawlError> {
        let seed_url = Url::parse(&config.start_url).map_err(|source| CrawlError::InvalidSeed {
            url: config.start_url.clone(),
            source,
        })?;

        let shaper = RequestShaper::new(config.anti_bot.clone());
        let rotator = Arc::new(ProxyRotator::new(&config.proxies));

        let mut builder = reqwest::Client::builder().timeout(config.timeout);

        if !config.anti_bot.user_agent_rotation {
            builder = builder.user_agent(&config.user_agent);
        }
        if !config.anti_bot.header_randomization && !config.accept_language.is_empty() {
            let mut defaults = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&config.accept_language) {
                defaults.insert(ACCEPT_LANGUAGE, value);
            }
            builder = builder.default_headers(defaults);
        }
        if shaper.cookies_enabled() {
            builder = builder.cookie_provider(antibot::build_cookie_jar());
        }
        builder = rotator.apply(builder);

        let client = builder.build()?;

        let expected_urls = config
            .max_visits
            .map(|v| v * 10)
            .unwrap_or(0)
            .max(MIN_EXPECTED_URLS);
        let visited = VisitedSet::with_capacity(expected_urls, VISITED_FP_RATE);

        let limiter = RateLimiter::with_domain_rules(
            config.parallel_requests,
            config.delay,
            config.random_delay,
            &config.allowed_domains,
        );

        let robots = RobotsGate::new(client.clone(), config.user_agent.clone());
        let url_filter = UrlFilter::from_config(&config);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            seed_url,
            state: RwLock::new(InstanceState::Idle),
            client,
            shaper,
            limiter,
            robots,
            url_filter,
            visited,
            store,
            metrics,
            queue: Mutex::new(VecDeque::new()),
            visit_count: AtomicUsize::new(0),
            shutdown,
            scheduler: Mutex::new(None),
        })
    }

    /// Begin crawling from the seed URL. Returns immediately; the crawl
    /// runs on the scheduler task. Calling on a running instance warns and
    /// does nothing.
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.write();
            match *state {
                InstanceState::Running | InstanceState::Stopping => {
                    tracing::warn!(seed = %self.seed_url, "Crawler is already running");
                    return;
                }
                InstanceState::Idle | InstanceState::Stopped => {
                    *state = InstanceState::Running;
                }
            }
        }

        self.shutdown.send_replace(false);
        self.visit_count.store(0, Ordering::SeqCst);

        self.visited.add(self.seed_url.as_str());
        self.queue
            .lock()
            .push_back(WorkItem::seed(self.seed_url.clone()));

        tracing::info!(seed = %self.seed_url, "Starting crawler");
        let handle = tokio::spawn(Arc::clone(self).run_scheduler());
        *self.scheduler.lock() = Some(handle);
    }

    /// Signal cancellation and wait for every worker to drain. Calling on
    /// a non-running instance warns and does nothing.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if *state != InstanceState::Running {
                tracing::warn!(seed = %self.seed_url, "Crawler is not running");
                return;
            }
            *state = InstanceState::Stopping;
        }

        tracing::info!(seed = %self.seed_url, "Stopping crawler...");
        self.shutdown.send_replace(true);

        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        *self.state.write() = InstanceState::Stopped;
        tracing::info!(seed = %self.seed_url, "Crawler stopped");
    }

    pub fn is_running(&self) -> bool {
        *self.state.read() == InstanceState::Running
    }

    pub fn state(&self) -> InstanceState {
        *self.state.read()
    }

    /// Number of requests admitted so far in this run.
    pub fn visit_count(&self) -> usize {
        self.visit_count.load(Ordering::SeqCst)
    }

    /// The visited-URL filter shared by this instance's workers.
    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    /// Transition to `Stopping` and raise the shutdown signal without
    /// joining workers; used from inside the pipeline when the visit cap
    /// is reached.
    fn begin_stop(&self) {
        {
            let mut state = self.state.write();
            if *state == InstanceState::Running {
                *state = InstanceState::Stopping;
            }
        }
        self.shutdown.send_replace(true);
    }

    /// Scheduler loop: draws items off the queue and fans them out to
    /// workers bounded by `parallel_requests`. Exits when cancelled or
    /// when the queue is empty with nothing in flight, then waits for all
    /// workers to finish before marking the instance stopped.
    async fn run_scheduler(self: Arc<Self>) {
        let max_workers = self.config.parallel_requests.max(1) as u32;
        let workers = Arc::new(Semaphore::new(max_workers as usize));
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let item = self.queue.lock().pop_front();
            match item {
                Some(item) => {
                    let permit = tokio::select! {
                        permit = workers.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                        _ = shutdown.changed() => {
                            self.queue.lock().push_front(item);
                            continue;
                        }
                    };

                    let crawler = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _permit = permit;
                        crawler.process_item(item).await;
                    });
                }
                None => {
                    // Queue drained; done once every worker has returned
                    if workers.available_permits() == max_workers as usize {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        // Wait for in-flight workers to acknowledge termination
        let _ = workers.acquire_many(max_workers).await;

        *self.state.write() = InstanceState::Stopped;
        tracing::debug!(seed = %self.seed_url, "Scheduler drained");
    }

    /// Process one work item end to end. Every await point races the
    /// shutdown signal so cancellation is observed promptly.
    async fn process_item(&self, item: WorkItem) {
        let count = self.visit_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(max_visits) = self.config.max_visits {
            if count > max_visits {
                tracing::info!(limit = max_visits, "Visit limit reached, stopping crawler");
                self.begin_stop();
                return;
            }
        }

        let mut shutdown = self.shutdown.subscribe();
        let host = item.url.host_str().unwrap_or_default().to_string();

        let admission = tokio::select! {
            admission = self.limiter.acquire(&host, self.shaper.jitter()) => admission,
            _ = shutdown.changed() => return,
        };

        tokio::select! {
            _ = self.fetch_and_process(&item) => {}
            _ = shutdown.changed() => {}
        }

        drop(admission);
    }

    /// Fetch a page, extract and persist its record, and enqueue the links
    /// it yields. Failures are logged and counted; nothing is retried.
    async fn fetch_and_process(&self, item: &WorkItem) {
        let mut headers = HeaderMap::new();
        self.shaper.decorate(&mut headers, item.referer.as_deref());

        let response = match self
            .client
            .get(item.url.clone())
            .headers(headers)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(url = %item.url, error = %e, "Request failed");
                if let Some(metrics) = &self.metrics {
                    metrics.request_errors_total.inc();
                }
                return;
            }
        };

        let status = response.status();
        if let Some(metrics) = &self.metrics {
            metrics.requests_total.inc();
            metrics.requests_by_status.inc(status.as_u16());
        }

        if !status.is_success() {
            tracing::warn!(url = %item.url, status = %status, "Skipping non-success response");
            return;
        }

        let final_url = response.url().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(url = %item.url, error = %e, "Failed to read response body");
                if let Some(metrics) = &self.metrics {
                    metrics.request_errors_total.inc();
                }
                return;
            }
        };

        // The DOM is neither Send nor cheap; parse on a blocking thread
        // and bring back owned results.
        let parse_base = final_url.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            let extracted = extract::extract_page(&body, &parse_base);
            (extracted, body)
        })
        .await;

        let (extracted, body) = match parsed {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(url = %item.url, error = %e, "Extraction task failed");
                return;
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.pages_crawled_total.inc();
        }

        let mut record = PageRecord::new(item.url.as_str());
        record.title = extracted.title;
        record.snippet = extracted.snippet;
        if self.config.enable_full_content {
            if let Some(metrics) = &self.metrics {
                metrics.content_size_bytes.observe(body.len() as u64);
            }
            record.full_content = body;
        }

        if let Err(e) = self.store.save_page(record).await {
            tracing::error!(url = %item.url, error = %e, "Failed to persist page");
        }

        let next_depth = item.depth + 1;
        if let Some(max_depth) = self.config.max_depth {
            if next_depth > max_depth {
                return;
            }
        }

        for link in extracted.links {
            self.consider_link(link, next_depth, item.url.as_str()).await;
        }
    }

    /// Run a discovered link through the filter policy, the robots gate
    /// and the visited set; enqueue it when it survives.
    async fn consider_link(&self, link: Url, depth: usize, referer: &str) {
        if !self.url_filter.is_allowed(&link) {
            return;
        }

        let link = if self.config.ignore_query_strings {
            filter::strip_query(&link)
        } else {
            link
        };

        if self.config.respect_robots_txt && !self.robots.is_allowed(&link).await {
            tracing::debug!(url = %link, "Disallowed by robots.txt");
            return;
        }

        if self.visited.contains(link.as_str()) {
            return;
        }
        self.visited.add(link.as_str());

        self.queue.lock().push_back(WorkItem {
            url: link,
            depth,
            referer: Some(referer.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileStore;

    fn test_config(start_url: &str) -> CrawlConfig {
        CrawlConfig {
            start_url: start_url.to_string(),
            respect_robots_txt: false,
            delay: Duration::from_millis(1),
            random_delay: Duration::ZERO,
            anti_bot: crate::config::AntiBotConfig {
                sophisticated_delays: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn test_store() -> (tempfile::TempDir, Arc<dyn PageStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("pages.json")));
        (dir, store)
    }

    #[tokio::test]
    async fn test_new_instance_is_idle() {
        let (_dir, store) = test_store();
        let crawler = Crawler::new(test_config("https://example.com/"), store, None).unwrap();

        assert_eq!(crawler.state(), InstanceState::Idle);
        assert!(!crawler.is_running());
    }

    #[tokio::test]
    async fn test_relative_seed_is_rejected() {
        let (_dir, store) = test_store();
        let result = Crawler::new(test_config("/not/absolute"), store, None);
        assert!(matches!(result, Err(CrawlError::InvalidSeed { .. })));
    }

    #[tokio::test]
    async fn test_stop_on_idle_instance_is_noop() {
        let (_dir, store) = test_store();
        let crawler = Crawler::new(test_config("https://example.com/"), store, None).unwrap();

        crawler.stop().await;
        assert_eq!(crawler.state(), InstanceState::Idle);
    }

    #[tokio::test]
    async fn test_double_start_keeps_one_scheduler() {
        let (_dir, store) = test_store();
        // Unroutable address; the crawl will fail its fetch and drain
        let crawler = Arc::new(
            Crawler::new(test_config("http://127.0.0.1:1/"), store, None).unwrap(),
        );

        crawler.start();
        let first_handle_exists = crawler.scheduler.lock().is_some();
        crawler.start(); // warns, no-op
        assert!(first_handle_exists);

        crawler.stop().await;
        assert!(!crawler.is_running());
    }

    #[tokio::test]
    async fn test_stop_returns_only_after_not_running() {
        let (_dir, store) = test_store();
        let crawler = Arc::new(
            Crawler::new(test_config("http://127.0.0.1:1/"), store, None).unwrap(),
        );

        crawler.start();
        crawler.stop().await;

        assert!(!crawler.is_running());
        assert_eq!(crawler.state(), InstanceState::Stopped);
    }
}
