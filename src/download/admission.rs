//! Per-domain admission control
//!
//! Counts running downloads per source domain and refuses a new start once
//! a domain reaches its ceiling. The tracker carries no lock of its own: it
//! lives inside the manager's registry guard so that "pick a queued download
//! and start it" is a single check-and-commit.

use std::collections::HashMap;

#[derive(Debug)]
pub struct DomainAdmission {
    max_per_domain: usize,
    active: HashMap<String, usize>,
}

impl DomainAdmission {
    /// A ceiling of zero would never admit anything, so it is raised to one.
    pub fn new(max_per_domain: usize) -> Self {
        if max_per_domain == 0 {
            tracing::warn!("max_per_domain of 0 is not usable, using 1");
        }
        Self {
            max_per_domain: max_per_domain.max(1),
            active: HashMap::new(),
        }
    }

    pub fn max_per_domain(&self) -> usize {
        self.max_per_domain
    }

    /// Take a slot for `domain` if one is free
    pub fn try_acquire(&mut self, domain: &str) -> bool {
        let count = self.active.entry(domain.to_string()).or_insert(0);
        if *count < self.max_per_domain {
            *count += 1;
            true
        } else {
            false
        }
    }

    /// Give back a slot. Releasing an idle domain is a no-op.
    pub fn release(&mut self, domain: &str) {
        match self.active.get_mut(domain) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.active.remove(domain);
            }
            None => {
                tracing::warn!("Release for idle domain '{}' ignored", domain);
            }
        }
    }

    /// Current running count for `domain` (absent = 0)
    pub fn active(&self, domain: &str) -> usize {
        self.active.get(domain).copied().unwrap_or(0)
    }

    pub fn total_active(&self) -> usize {
        self.active.values().sum()
    }
}

/// Extract the admission bucket (host) from a URL
pub fn extract_domain(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}
