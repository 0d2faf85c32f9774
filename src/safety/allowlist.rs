//! Host allowlist for outbound relay requests.
//!
//! Hosts are compared after URL parsing, never by substring, so
//! `generativelanguage.googleapis.com.attacker.net` or
//! `https://generativelanguage.googleapis.com@attacker.net/` do not match
//! `generativelanguage.googleapis.com`.

use std::fmt;
use std::net::IpAddr;

use url::{Host, Url};

/// Pattern for matching allowed hosts.
#[derive(Debug, Clone)]
pub struct DomainPattern {
    /// The pattern as configured (e.g., "api.example.com" or "*.example.com").
    pattern: String,
    is_wildcard: bool,
    base_domain: String,
}

impl DomainPattern {
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.trim();
        let is_wildcard = pattern.starts_with("*.");
        let base_domain = if is_wildcard {
            pattern[2..].to_lowercase()
        } else {
            pattern.to_lowercase()
        };

        Self {
            pattern: pattern.to_string(),
            is_wildcard,
            base_domain: base_domain.trim_end_matches('.').to_string(),
        }
    }

    /// Check if a host matches this pattern.
    pub fn matches(&self, host: &str) -> bool {
        let host_lower = host.to_lowercase();
        let host_lower = host_lower.trim_end_matches('.');

        if self.is_wildcard {
            // *.example.com matches foo.example.com, bar.baz.example.com, example.com
            host_lower == self.base_domain
                || host_lower
                    .strip_suffix(&self.base_domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        } else {
            host_lower == self.base_domain
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

/// Result of host validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainValidationResult {
    Allowed,
    Denied(String),
}

impl DomainValidationResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DomainValidationResult::Allowed)
    }
}

/// Validates hosts against an allowlist.
#[derive(Debug, Clone)]
pub struct DomainAllowlist {
    patterns: Vec<DomainPattern>,
}

impl DomainAllowlist {
    /// Create a new allowlist from host patterns.
    pub fn new<S: AsRef<str>>(domains: &[S]) -> Self {
        Self {
            patterns: domains
                .iter()
                .map(|d| d.as_ref())
                .filter(|d| !d.trim().is_empty())
                .map(DomainPattern::new)
                .collect(),
        }
    }

    /// Create an empty allowlist (denies everything).
    pub fn empty() -> Self {
        Self { patterns: vec![] }
    }

    /// Check if a host name is allowed.
    ///
    /// Raw IP addresses are always refused: the allowlist is
    /// domain-name-only.
    pub fn is_allowed(&self, host: &str) -> DomainValidationResult {
        if self.patterns.is_empty() {
            return DomainValidationResult::Denied("empty allowlist".to_string());
        }

        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if bare.parse::<IpAddr>().is_ok() {
            return DomainValidationResult::Denied(format!(
                "raw IP address '{}' not allowed; use domain names only",
                host
            ));
        }

        if self.patterns.iter().any(|p| p.matches(host)) {
            return DomainValidationResult::Allowed;
        }

        DomainValidationResult::Denied(format!(
            "host '{}' not in allowlist: [{}]",
            host,
            self.patterns
                .iter()
                .map(|p| p.pattern())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Check the host of an already-parsed URL.
    pub fn is_url_allowed(&self, url: &Url) -> DomainValidationResult {
        match url.host() {
            Some(Host::Domain(domain)) => self.is_allowed(domain),
            Some(Host::Ipv4(ip)) => DomainValidationResult::Denied(format!(
                "raw IP address '{}' not allowed; use domain names only",
                ip
            )),
            Some(Host::Ipv6(ip)) => DomainValidationResult::Denied(format!(
                "raw IP address '{}' not allowed; use domain names only",
                ip
            )),
            None => DomainValidationResult::Denied("URL has no host".to_string()),
        }
    }

    pub fn patterns(&self) -> &[DomainPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}
