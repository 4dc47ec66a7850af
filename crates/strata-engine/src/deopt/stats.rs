//! Counted, reason-keyed deoptimization sites
//!
//! Every deopt routes through one record per (method, bci, reason): the
//! same site triggering the same way a million times touches a single
//! counter instead of growing new dispatch artifacts. Speculation failures
//! surface here and in the structured log, never as errors to user code.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::deopt::reason::DeoptReason;
use crate::method::MethodId;

/// Identifies one deoptimization site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeoptSiteKey {
    /// Owning method
    pub method: MethodId,
    /// Triggering bytecode index
    pub bci: u32,
    /// Classified reason
    pub reason: DeoptReason,
}

/// The single dispatch record for a site
#[derive(Debug, Default)]
pub struct DeoptSite {
    count: AtomicU64,
}

impl DeoptSite {
    /// Times this site has triggered
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Registry of deoptimization sites
#[derive(Default)]
pub struct DeoptSiteStats {
    sites: DashMap<DeoptSiteKey, Arc<DeoptSite>>,
}

impl DeoptSiteStats {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one trigger at `key`, returning the site's single record
    pub fn record(&self, key: DeoptSiteKey) -> Arc<DeoptSite> {
        let site = self
            .sites
            .entry(key)
            .or_insert_with(|| Arc::new(DeoptSite::default()))
            .clone();
        site.count.fetch_add(1, Ordering::Relaxed);
        site
    }

    /// The record for `key`, if that site ever triggered
    pub fn site(&self, key: DeoptSiteKey) -> Option<Arc<DeoptSite>> {
        self.sites.get(&key).map(|s| s.clone())
    }

    /// Number of distinct sites ever recorded
    pub fn distinct_sites(&self) -> usize {
        self.sites.len()
    }

    /// Total triggers across all sites of a method
    pub fn total_for_method(&self, method: MethodId) -> u64 {
        self.sites
            .iter()
            .filter(|entry| entry.key().method == method)
            .map(|entry| entry.value().count())
            .sum()
    }
}
