//! Scripted tracker client for tests and benchmarks.
//!
//! Responses are keyed by canonical URL. Unscripted URLs resolve as
//! `NotFound`. Every call is counted, and the highest number of overlapping
//! calls is recorded so tests can check concurrency bounds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::reference::IssueKey;
use crate::status::IssueState;
use crate::tracker::{FetchError, FetchOutcome, TrackerClient};

#[derive(Debug, Default)]
pub struct MockTracker {
    responses: HashMap<String, FetchOutcome>,
    delays: HashMap<String, Duration>,
    panics: Vec<String>,
    default_delay: Duration,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, url: &str, state: IssueState) -> Self {
        self.responses.insert(url.to_string(), Ok(state));
        self
    }

    pub fn with_error(mut self, url: &str, error: FetchError) -> Self {
        self.responses.insert(url.to_string(), Err(error));
        self
    }

    /// Delay every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Delay calls for one URL
    pub fn with_delay_for(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Panic when asked for this URL
    pub fn with_panic(mut self, url: &str) -> Self {
        self.panics.push(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    /// Highest number of calls that were in progress at once
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Decrements the active-call count even if the call is cancelled
struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrackerClient for MockTracker {
    async fn fetch(&self, key: &IssueKey) -> FetchOutcome {
        self.calls.lock().unwrap().push(key.url.clone());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveCall(&self.active);

        let delay = self.delays.get(&key.url).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.panics.contains(&key.url) {
            panic!("scripted tracker panic for {}", key.url);
        }
        self.responses
            .get(&key.url)
            .cloned()
            .unwrap_or(Err(FetchError::NotFound))
    }
}
