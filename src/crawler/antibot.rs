//! Anti-bot request shaping
//!
//! Decorates outgoing requests so the crawler blends in with browser
//! traffic: rotating user agents, randomized Accept-* headers, a
//! browser-grade cookie jar and jittered inter-request delays. Each measure
//! toggles independently via [`AntiBotConfig`]. The referer policy is
//! always on: a request carries the URL of the page that linked to it.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, REFERER,
    USER_AGENT,
};
use reqwest_cookie_store::CookieStoreMutex;

use crate::config::AntiBotConfig;

/// Contemporary browser user agents for rotation.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/97.0.4692.71 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:95.0) Gecko/20100101 Firefox/95.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36 Edg/96.0.1054.62",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36 OPR/82.0.4227.44",
];

/// Accept-Language values seen from real browsers.
const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-CA,en;q=0.9,fr-CA;q=0.8",
    "en;q=0.9",
    "en-US,en;q=0.8,de;q=0.5",
];

const ACCEPT_VALUES: &[&str] = &[
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9",
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
];

const ACCEPT_ENCODINGS: &[&str] = &[
    "gzip, deflate, br",
    "gzip, deflate",
    "br;q=1.0, gzip;q=0.8, *;q=0.1",
];

/// Per-instance request decorator driven by an [`AntiBotConfig`] policy.
pub struct RequestShaper {
    policy: AntiBotConfig,
    user_agents: Vec<String>,
    accept_languages: Vec<String>,
}

impl RequestShaper {
    /// Build a shaper, merging caller-supplied pools into the built-ins.
    pub fn new(policy: AntiBotConfig) -> Self {
        let mut user_agents: Vec<String> = USER_AGENTS.iter().map(|s| s.to_string()).collect();
        user_agents.extend(policy.custom_user_agents.iter().cloned());

        let mut accept_languages: Vec<String> =
            ACCEPT_LANGUAGES.iter().map(|s| s.to_string()).collect();
        accept_languages.extend(policy.custom_accept_languages.iter().cloned());

        Self {
            policy,
            user_agents,
            accept_languages,
        }
    }

    /// Decorate the headers of an outgoing request.
    ///
    /// Applies user-agent rotation and header randomization when enabled,
    /// and always sets the referer when an originator is known.
    pub fn decorate(&self, headers: &mut HeaderMap, referer: Option<&str>) {
        let mut rng = rand::thread_rng();

        if self.policy.user_agent_rotation {
            let ua = &self.user_agents[rng.gen_range(0..self.user_agents.len())];
            if let Ok(value) = HeaderValue::from_str(ua) {
                headers.insert(USER_AGENT, value);
            }
        }

        if self.policy.header_randomization {
            let lang = &self.accept_languages[rng.gen_range(0..self.accept_languages.len())];
            if let Ok(value) = HeaderValue::from_str(lang) {
                headers.insert(ACCEPT_LANGUAGE, value);
            }

            let accept = ACCEPT_VALUES[rng.gen_range(0..ACCEPT_VALUES.len())];
            headers.insert(ACCEPT, HeaderValue::from_static(accept));

            let encoding = ACCEPT_ENCODINGS[rng.gen_range(0..ACCEPT_ENCODINGS.len())];
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(encoding));

            // Some browsers send DNT, some don't
            if rng.gen_bool(0.5) {
                headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
            }

            // Sec-Fetch quadruple as sent on top-level navigations
            if rng.gen_bool(0.5) {
                headers.insert(
                    HeaderName::from_static("sec-fetch-dest"),
                    HeaderValue::from_static("document"),
                );
                headers.insert(
                    HeaderName::from_static("sec-fetch-mode"),
                    HeaderValue::from_static("navigate"),
                );
                headers.insert(
                    HeaderName::from_static("sec-fetch-site"),
                    HeaderValue::from_static("none"),
                );
                headers.insert(
                    HeaderName::from_static("sec-fetch-user"),
                    HeaderValue::from_static("?1"),
                );
            }
        }

        if let Some(referer) = referer {
            if let Ok(value) = HeaderValue::from_str(referer) {
                headers.insert(REFERER, value);
            }
        }
    }

    /// Per-request jitter for the rate limiter, when sophisticated delays
    /// are enabled.
    pub fn jitter(&self) -> Option<Duration> {
        if self.policy.sophisticated_delays {
            Some(random_delay(self.policy.base_delay, self.policy.random_delay_factor))
        } else {
            None
        }
    }

    /// Whether the instance should attach a cookie jar to its client.
    pub fn cookies_enabled(&self) -> bool {
        self.policy.cookie_handling
    }
}

/// Build a browser-like cookie jar shareable with a reqwest client.
///
/// The underlying store applies cookie domain-matching rules (public-suffix
/// aware), so a cookie set by `a.example.com` is only returned to
/// `b.example.com` when domain rules permit.
pub fn build_cookie_jar() -> Arc<CookieStoreMutex> {
    // The re-exported store type guarantees version compatibility with the
    // reqwest adapter
    Arc::new(CookieStoreMutex::new(
        reqwest_cookie_store::CookieStore::default(),
    ))
}

/// Random delay of `base * f` where `f` is drawn uniformly from
/// `[0.5 * factor, 1.5 * factor)` and floored at 0.5.
pub fn random_delay(base: Duration, factor: f64) -> Duration {
    let draw: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let f = (0.5 * factor + draw * factor).max(0.5);
    base.mul_f64(f)
}
