//! URL filter policy for discovered links
//!
//! Applied before deduplication. Domain rules match the host exactly and
//! take precedence over URL substring rules; the robots gate (when enabled)
//! runs last, in the instance pipeline.

use url::Url;

use crate::config::CrawlConfig;

/// Allow/deny policy compiled from the instance configuration.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    allowed_urls: Vec<String>,
    disallowed_urls: Vec<String>,
    allowed_domains: Vec<String>,
    disallowed_domains: Vec<String>,
}

impl UrlFilter {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            allowed_urls: config.allowed_urls.clone(),
            disallowed_urls: config.disallowed_urls.clone(),
            allowed_domains: config.allowed_domains.clone(),
            disallowed_domains: config.disallowed_domains.clone(),
        }
    }

    /// Whether a discovered URL passes the configured boundaries.
    pub fn is_allowed(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or_default();

        // Domain rules win over URL substring rules
        if self
            .disallowed_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(host))
        {
            return false;
        }
        if !self.allowed_domains.is_empty()
            && !self
                .allowed_domains
                .iter()
                .any(|d| d.eq_ignore_ascii_case(host))
        {
            return false;
        }

        let url_str = url.as_str();
        if !self.allowed_urls.is_empty()
            && !self.allowed_urls.iter().any(|p| url_str.contains(p.as_str()))
        {
            return false;
        }
        if self
            .disallowed_urls
            .iter()
            .any(|p| url_str.contains(p.as_str()))
        {
            return false;
        }

        true
    }
}

/// Strip the query string (and fragment) from a URL, for configurations
/// that treat query variants as the same page.
pub fn strip_query(url: &Url) -> Url {
    let mut stripped = url.clone();
    stripped.set_query(None);
    stripped.set_fragment(None);
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(
        allowed_urls: &[&str],
        disallowed_urls: &[&str],
        allowed_domains: &[&str],
        disallowed_domains: &[&str],
    ) -> UrlFilter {
        UrlFilter {
            allowed_urls: allowed_urls.iter().map(|s| s.to_string()).collect(),
            disallowed_urls: disallowed_urls.iter().map(|s| s.to_string()).collect(),
            allowed_domains: allowed_domains.iter().map(|s| s.to_string()).collect(),
            disallowed_domains: disallowed_domains.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_allowed_url_substrings() {
        let f = filter(&["api"], &[], &[], &[]);

        assert!(f.is_allowed(&Url::parse("https://host/api/v1").unwrap()));
        assert!(!f.is_allowed(&Url::parse("https://host/web/v1").unwrap()));
    }

    #[test]
    fn test_disallowed_beats_allowed() {
        let f = filter(&["doc"], &[".pdf"], &[], &[]);

        assert!(f.is_allowed(&Url::parse("https://host/doc.html").unwrap()));
        assert!(!f.is_allowed(&Url::parse("https://host/doc.pdf").unwrap()));
    }

    #[test]
    fn test_allowed_domains_drop_other_hosts() {
        let f = filter(&[], &[], &["example.com"], &[]);

        assert!(f.is_allowed(&Url::parse("https://example.com/page").unwrap()));
        assert!(!f.is_allowed(&Url::parse("https://other.com/page").unwrap()));
    }

    #[test]
    fn test_disallowed_domains() {
        let f = filter(&[], &[], &[], &["evil.com"]);

        assert!(f.is_allowed(&Url::parse("https://good.com/page").unwrap()));
        assert!(!f.is_allowed(&Url::parse("https://evil.com/page").unwrap()));
    }

    #[test]
    fn test_domain_rule_wins_over_url_substring() {
        // URL substring allows it, but the domain is denied
        let f = filter(&["page"], &[], &[], &["evil.com"]);
        assert!(!f.is_allowed(&Url::parse("https://evil.com/page").unwrap()));
    }

    #[test]
    fn test_empty_filter_allows_everything() {
        let f = UrlFilter::default();
        assert!(f.is_allowed(&Url::parse("https://anything.example/path?q=1").unwrap()));
    }

    #[test]
    fn test_strip_query() {
        let url = Url::parse("https://host/page?session=abc#top").unwrap();
        assert_eq!(strip_query(&url).as_str(), "https://host/page");
    }
}
