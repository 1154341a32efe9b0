//! Domain filtering shared by both proxies.

use crate::config::{matches_domain, NetworkConfig};

/// Per-request decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Allow,
    Deny,
}

/// The policy callback handed to the proxies: denied patterns win, then the
/// allow list is consulted, and anything unmatched is denied. Built from no
/// configuration, it denies everything.
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    allowed_domains: Vec<String>,
    denied_domains: Vec<String>,
}

impl DomainFilter {
    /// Build a filter from network configuration. `None` denies all.
    pub fn from_config(config: Option<&NetworkConfig>) -> Self {
        match config {
            Some(config) => Self {
                allowed_domains: config.allowed_domains.clone(),
                denied_domains: config.denied_domains.clone(),
            },
            None => Self::default(),
        }
    }

    /// Decide for a hostname (or numeric address) and port.
    pub fn check(&self, hostname: &str, _port: u16) -> FilterDecision {
        for pattern in &self.denied_domains {
            if matches_domain(hostname, pattern) {
                return FilterDecision::Deny;
            }
        }
        for pattern in &self.allowed_domains {
            if matches_domain(hostname, pattern) {
                return FilterDecision::Allow;
            }
        }
        FilterDecision::Deny
    }

    pub fn is_allowed(&self, hostname: &str, port: u16) -> bool {
        self.check(hostname, port) == FilterDecision::Allow
    }

    /// Whether the literal `*` entry makes this filter pass everything not
    /// explicitly denied.
    pub fn allows_all(&self) -> bool {
        self.allowed_domains.iter().any(|p| p == "*")
    }
}
