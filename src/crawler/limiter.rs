//! Global and per-domain rate limiting
//!
//! A request is admitted once every matching rule has a free concurrency
//! slot and at least `delay + rand(0, random_delay)` has elapsed since that
//! rule's previous admission. Rules are matched in a fixed order (wildcard
//! first), so concurrent workers never acquire slots in conflicting orders.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// One admission rule: which domains it covers, how many requests may be in
/// flight against it, and the minimum spacing between request starts.
#[derive(Debug, Clone)]
pub struct RateRule {
    /// `"*"` for the global rule, or an exact hostname
    pub domain_glob: String,
    /// Maximum in-flight requests matching this rule
    pub parallelism: usize,
    /// Base spacing between admissions
    pub delay: Duration,
    /// Upper bound of the random spacing component
    pub random_delay: Duration,
}

struct RuleState {
    rule: RateRule,
    slots: Arc<Semaphore>,
    last_admission: Mutex<Option<Instant>>,
}

impl RuleState {
    fn matches(&self, host: &str) -> bool {
        self.rule.domain_glob == "*" || self.rule.domain_glob.eq_ignore_ascii_case(host)
    }
}

/// Domain-keyed admission controller for an instance's workers.
pub struct RateLimiter {
    rules: Vec<RuleState>,
}

/// Concurrency slots held for the duration of one request. Dropping the
/// admission releases every slot.
pub struct Admission {
    _permits: Vec<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(rules: Vec<RateRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| RuleState {
                slots: Arc::new(Semaphore::new(rule.parallelism.max(1))),
                last_admission: Mutex::new(None),
                rule,
            })
            .collect();
        Self { rules }
    }

    /// Build the standard rule set: one wildcard rule, plus a rule per
    /// allowed domain with doubled parallelism to reward trusted hosts.
    pub fn with_domain_rules(
        parallelism: usize,
        delay: Duration,
        random_delay: Duration,
        allowed_domains: &[String],
    ) -> Self {
        let mut rules = vec![RateRule {
            domain_glob: "*".to_string(),
            parallelism,
            delay,
            random_delay,
        }];
        for domain in allowed_domains {
            rules.push(RateRule {
                domain_glob: domain.clone(),
                parallelism: parallelism * 2,
                delay,
                random_delay,
            });
        }
        Self::new(rules)
    }

    /// Wait until a request to `host` is admitted.
    ///
    /// `jitter` substitutes the anti-bot shaper's per-request delay for the
    /// rule's own `random_delay` draw. Spacing sleeps happen while holding
    /// the rule's admission lock, which serializes admission starts against
    /// that rule.
    pub async fn acquire(&self, host: &str, jitter: Option<Duration>) -> Admission {
        let mut permits = Vec::new();

        for state in self.rules.iter().filter(|s| s.matches(host)) {
            let permit = state
                .slots
                .clone()
                .acquire_owned()
                .await
                .expect("rate limiter semaphore is never closed");

            let mut last = state.last_admission.lock().await;

            let spread = jitter.unwrap_or_else(|| {
                let max_ms = state.rule.random_delay.as_millis() as u64;
                if max_ms == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
                }
            });
            let spacing = state.rule.delay + spread;

            if let Some(prev) = *last {
                let next_allowed = prev + spacing;
                let now = Instant::now();
                if next_allowed > now {
                    tokio::time::sleep(next_allowed - now).await;
                }
            }
            *last = Some(Instant::now());
            drop(last);

            permits.push(permit);
        }

        Admission { _permits: permits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_rule(parallelism: usize, delay: Duration) -> RateLimiter {
        RateLimiter::new(vec![RateRule {
            domain_glob: "*".to_string(),
            parallelism,
            delay,
            random_delay: Duration::ZERO,
        }])
    }

    #[tokio::test]
    async fn test_admissions_are_spaced_by_delay() {
        let limiter = single_rule(1, Duration::from_millis(100));

        let start = Instant::now();
        drop(limiter.acquire("example.com", None).await);
        drop(limiter.acquire("example.com", None).await);
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(100),
            "admissions spaced only {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_parallelism_caps_in_flight_requests() {
        let limiter = Arc::new(single_rule(1, Duration::ZERO));

        let admission = limiter.acquire("example.com", None).await;

        // Slot is taken; a second acquire must not complete
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            limiter.acquire("example.com", None),
        )
        .await;
        assert!(second.is_err(), "second admission should have blocked");

        drop(admission);

        let third = tokio::time::timeout(
            Duration::from_millis(200),
            limiter.acquire("example.com", None),
        )
        .await;
        assert!(third.is_ok(), "admission should proceed after release");
    }

    #[tokio::test]
    async fn test_domain_rules_only_gate_their_host() {
        let limiter = RateLimiter::with_domain_rules(
            4,
            Duration::from_millis(200),
            Duration::ZERO,
            &["slow.example.com".to_string()],
        );

        // The wildcard rule applies to every host; the domain rule must
        // only add spacing for its own host.
        assert_eq!(limiter.rules.len(), 2);
        assert!(limiter.rules[0].matches("fast.example.com"));
        assert!(!limiter.rules[1].matches("fast.example.com"));
        assert!(limiter.rules[1].matches("slow.example.com"));
    }

    #[tokio::test]
    async fn test_allowed_domains_get_doubled_parallelism() {
        let limiter = RateLimiter::with_domain_rules(
            3,
            Duration::ZERO,
            Duration::ZERO,
            &["trusted.com".to_string()],
        );

        assert_eq!(limiter.rules[0].rule.parallelism, 3);
        assert_eq!(limiter.rules[1].rule.parallelism, 6);
    }

    #[tokio::test]
    async fn test_jitter_override_extends_spacing() {
        let limiter = single_rule(1, Duration::from_millis(20));

        let start = Instant::now();
        drop(
            limiter
                .acquire("example.com", Some(Duration::from_millis(80)))
                .await,
        );
        drop(
            limiter
                .acquire("example.com", Some(Duration::from_millis(80)))
                .await,
        );
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(100),
            "jittered admissions spaced only {:?}",
            elapsed
        );
    }
}
