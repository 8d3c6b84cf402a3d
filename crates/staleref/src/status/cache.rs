//
// status/cache.rs
//
// TTL cache of resolved tracker state, keyed by canonical URL
//

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::IssueState;

/// Default time-to-live for cached state
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    state: IssueState,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Status cache with lazy expiry.
///
/// Reads treat an expired entry as absent and evict it, so callers never see
/// state older than the TTL. [`StatusCache::prune`] sweeps eagerly and exists
/// only to bound memory. Timestamps come from `tokio::time::Instant` so a
/// paused runtime clock drives expiry in tests.
#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    inner: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_TTL)
    }
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // Every mutation is a single map call, so a poisoned map is still whole
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, url: &str) -> Option<IssueState> {
        let mut guard = self.entries();
        let now = Instant::now();
        match guard.get(url).map(|entry| entry.is_fresh(now, self.ttl)) {
            Some(true) => guard.get(url).map(|entry| entry.state.clone()),
            Some(false) => {
                log::trace!("Status cache entry expired: {}", url);
                guard.remove(url);
                None
            }
            None => None,
        }
    }

    /// Store a state, replacing any previous entry and restarting its TTL.
    pub fn set(&self, url: impl Into<String>, state: IssueState) {
        self.entries().insert(
            url.into(),
            CacheEntry {
                state,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn has(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    /// Returns true if an entry (fresh or not) was removed.
    pub fn remove(&self, url: &str) -> bool {
        self.entries().remove(url).is_some()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn prune(&self) -> usize {
        let mut guard = self.entries();
        let now = Instant::now();
        let before = guard.len();
        guard.retain(|_, entry| entry.is_fresh(now, self.ttl));
        let removed = before - guard.len();
        if removed > 0 {
            log::debug!("Pruned {} expired status cache entries", removed);
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn size(&self) -> usize {
        self.entries().len()
    }
}
