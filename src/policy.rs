//! URL ignore policy.
//!
//! Decides which URLs are never tracked or emitted. Rules come from the
//! `[privacy]` configuration section:
//! - glob patterns matched against the full URL
//! - domains, matched together with their subdomains
//! - URL schemes

use crate::config::PrivacyConfig;
use tracing::{debug, warn};
use url::Url;

/// Configuration-supplied ignore predicate
#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    /// Compiled URL patterns
    patterns: Vec<glob::Pattern>,
    /// Lowercased domains
    domains: Vec<String>,
    /// Lowercased schemes without the trailing colon
    schemes: Vec<String>,
}

impl UrlPolicy {
    /// Create a policy from the privacy configuration
    pub fn new(config: &PrivacyConfig) -> Self {
        let patterns = config
            .ignored_url_patterns
            .iter()
            .filter_map(|pattern| {
                glob::Pattern::new(pattern)
                    .map_err(|e| {
                        warn!("Invalid ignored URL pattern '{}': {}", pattern, e);
                        e
                    })
                    .ok()
            })
            .collect();

        let domains = config
            .ignored_domains
            .iter()
            .map(|d| d.trim().trim_start_matches('.').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        let schemes = config
            .ignored_schemes
            .iter()
            .map(|s| s.trim().trim_end_matches(':').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            patterns,
            domains,
            schemes,
        }
    }

    /// Check whether a URL must never be tracked or emitted
    pub fn should_ignore(&self, url: &str) -> bool {
        for pattern in &self.patterns {
            if pattern.matches(url) {
                debug!("URL '{}' ignored by pattern '{}'", url, pattern);
                return true;
            }
        }

        if self.domains.is_empty() && self.schemes.is_empty() {
            return false;
        }

        // Scheme and domain rules only apply to URLs that parse
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };

        if self.schemes.iter().any(|s| s == parsed.scheme()) {
            debug!("URL '{}' ignored by scheme", url);
            return true;
        }

        if let Some(host) = parsed.host_str() {
            let host = host.to_lowercase();
            for domain in &self.domains {
                if host == *domain || host.ends_with(&format!(".{}", domain)) {
                    debug!("URL '{}' ignored by domain '{}'", url, domain);
                    return true;
                }
            }
        }

        false
    }

    /// Whether any rule is configured
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.domains.is_empty() && self.schemes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(patterns: &[&str], domains: &[&str], schemes: &[&str]) -> UrlPolicy {
        UrlPolicy::new(&PrivacyConfig {
            ignored_url_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            ignored_domains: domains.iter().map(|s| s.to_string()).collect(),
            ignored_schemes: schemes.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_default_ignores_nothing() {
        let policy = UrlPolicy::default();
        assert!(policy.is_empty());
        assert!(!policy.should_ignore("https://example.com"));
        assert!(!policy.should_ignore("chrome://settings"));
        assert!(!policy.should_ignore("not a url"));
    }

    #[test]
    fn test_pattern_rules() {
        let policy = policy(&["https://mail.example.com/*", "*/private/*"], &[], &[]);

        assert!(policy.should_ignore("https://mail.example.com/inbox"));
        assert!(policy.should_ignore("https://docs.test/private/notes"));
        assert!(!policy.should_ignore("https://example.com/public"));
    }

    #[test]
    fn test_domain_rules_include_subdomains() {
        let policy = policy(&[], &["Bank.Example", ".health.test"], &[]);

        assert!(policy.should_ignore("https://bank.example/login"));
        assert!(policy.should_ignore("https://online.bank.example/accounts"));
        assert!(policy.should_ignore("https://health.test/"));
        assert!(!policy.should_ignore("https://notbank.example/"));
        assert!(!policy.should_ignore("https://example.com/?q=bank.example"));
    }

    #[test]
    fn test_scheme_rules() {
        let policy = policy(&[], &[], &["chrome", "about:"]);

        assert!(policy.should_ignore("chrome://extensions"));
        assert!(policy.should_ignore("about:blank"));
        assert!(!policy.should_ignore("https://example.com"));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let policy = policy(&["[unclosed", "*secret*"], &[], &[]);

        assert!(policy.should_ignore("https://example.com/secret"));
        assert!(!policy.should_ignore("https://example.com/open"));
    }
}
