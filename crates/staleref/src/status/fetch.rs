//
// status/fetch.rs
//
// Cache-first batch resolution of tracker state
//

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use super::cache::StatusCache;
use crate::generation::GenerationToken;
use crate::reference::IssueKey;
use crate::tracker::{FetchError, FetchOutcome, TrackerClient};

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome per requested URL, in request order
pub type StatusMap = IndexMap<String, FetchOutcome>;

/// Pending fetches keyed by URL. Each receiver yields `Some(outcome)` once the
/// owning fetch settles.
type InFlightMap = HashMap<String, watch::Receiver<Option<FetchOutcome>>>;

fn lock_in_flight(map: &Mutex<InFlightMap>) -> MutexGuard<'_, InFlightMap> {
    // The map holds no invariants a panicking holder could break
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a URL from the in-flight map when its fetch task ends, including
/// when the task is aborted or panics.
struct InFlightGuard {
    map: Arc<Mutex<InFlightMap>>,
    url: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.map).remove(&self.url);
    }
}

/// Resolves batches of references against the status cache and a tracker.
///
/// - Cache hits never reach the tracker; a batch of pure hits returns at once.
/// - Misses run as independent tasks, at most `max_concurrent` at a time, each
///   under its own timeout. One failure never affects another URL.
/// - A URL already being fetched by another batch is awaited, not refetched.
///   Fetch tasks are detached, so a batch that is dropped mid-flight never
///   cancels a fetch another batch is waiting on.
/// - Every requested URL appears in the result, as a state or an error.
pub struct StatusFetcher {
    client: Arc<dyn TrackerClient>,
    cache: Arc<StatusCache>,
    limiter: Arc<Semaphore>,
    in_flight: Arc<Mutex<InFlightMap>>,
    timeout: Duration,
}

impl std::fmt::Debug for StatusFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusFetcher")
            .field("timeout", &self.timeout)
            .field("available_permits", &self.limiter.available_permits())
            .finish_non_exhaustive()
    }
}

impl StatusFetcher {
    pub fn new(
        client: Arc<dyn TrackerClient>,
        cache: Arc<StatusCache>,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    /// Number of URLs currently being fetched
    pub fn in_flight_count(&self) -> usize {
        lock_in_flight(&self.in_flight).len()
    }

    /// Resolve every key, cache first.
    ///
    /// Successful fetches are written to the cache only while `generation` is
    /// still current; the returned map is complete either way and callers
    /// decide whether to use it.
    pub async fn fetch_batch(&self, keys: &[IssueKey], generation: &GenerationToken) -> StatusMap {
        let mut hits = HashMap::new();
        let mut misses = Vec::new();
        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(key.url.as_str()) {
                continue;
            }
            match self.cache.get(&key.url) {
                Some(state) => {
                    hits.insert(key.url.clone(), state);
                }
                None => misses.push(key),
            }
        }

        if misses.is_empty() {
            log::trace!("All {} statuses served from cache", hits.len());
            return assemble(keys, hits, HashMap::new());
        }

        let mut tasks: Vec<JoinHandle<(String, FetchOutcome)>> = Vec::new();
        let mut shared = Vec::new();
        {
            let mut in_flight = lock_in_flight(&self.in_flight);
            for key in misses {
                if let Some(rx) = in_flight.get(&key.url) {
                    shared.push((key.url.clone(), rx.clone()));
                    continue;
                }
                let (tx, rx) = watch::channel(None);
                in_flight.insert(key.url.clone(), rx);
                tasks.push(tokio::spawn(run_fetch(
                    self.client.clone(),
                    self.limiter.clone(),
                    InFlightGuard {
                        map: self.in_flight.clone(),
                        url: key.url.clone(),
                    },
                    key.clone(),
                    tx,
                    self.timeout,
                )));
            }
        }
        let started = tasks.len();
        let shared_count = shared.len();

        let mut fresh = HashMap::new();
        for (url, mut rx) in shared {
            let outcome = match rx.wait_for(|v| v.is_some()).await {
                Ok(value) => (*value).clone(),
                Err(_) => None,
            };
            let outcome = outcome.unwrap_or_else(|| {
                Err(FetchError::Transport(
                    "shared request ended without a result".to_string(),
                ))
            });
            fresh.insert(url, outcome);
        }

        for task in tasks {
            match task.await {
                Ok((url, outcome)) => {
                    fresh.insert(url, outcome);
                }
                Err(e) => log::warn!("Status fetch task failed: {}", e),
            }
        }

        if generation.is_current() {
            for (url, outcome) in &fresh {
                if let Ok(state) = outcome {
                    self.cache.set(url.clone(), state.clone());
                }
            }
        } else {
            log::trace!(
                "Generation {} superseded; not caching {} fetched statuses",
                generation.generation(),
                fresh.len()
            );
        }

        let failed = fresh.values().filter(|o| o.is_err()).count();
        log::debug!(
            "Resolved {} statuses ({} cached, {} fetched, {} shared, {} failed)",
            hits.len() + fresh.len(),
            hits.len(),
            started,
            shared_count,
            failed
        );

        assemble(keys, hits, fresh)
    }
}

/// Run one tracker call under the concurrency limit and timeout, then publish
/// the outcome to any batch sharing it.
async fn run_fetch(
    client: Arc<dyn TrackerClient>,
    limiter: Arc<Semaphore>,
    _guard: InFlightGuard,
    key: IssueKey,
    tx: watch::Sender<Option<FetchOutcome>>,
    timeout: Duration,
) -> (String, FetchOutcome) {
    let outcome = match limiter.acquire_owned().await {
        Ok(_permit) => match tokio::time::timeout(timeout, client.fetch(&key)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::Timeout(timeout)),
        },
        Err(_) => Err(FetchError::Transport("fetch limiter closed".to_string())),
    };
    let outcome = outcome.map(|state| state.normalized_for(key.kind));

    if let Err(e) = &outcome {
        log::debug!("Failed to resolve {} [{}]: {}", key.url, e.category(), e);
    }

    tx.send_replace(Some(outcome.clone()));
    (key.url, outcome)
}

/// Build the result in request order, filling any gap with an explicit error.
fn assemble(
    keys: &[IssueKey],
    mut hits: HashMap<String, crate::status::IssueState>,
    mut fresh: HashMap<String, FetchOutcome>,
) -> StatusMap {
    let mut statuses = StatusMap::with_capacity(keys.len());
    for key in keys {
        if statuses.contains_key(&key.url) {
            continue;
        }
        let outcome = match hits.remove(&key.url) {
            Some(state) => Ok(state),
            None => fresh.remove(&key.url).unwrap_or_else(|| {
                Err(FetchError::Transport(
                    "fetch task ended without reporting".to_string(),
                ))
            }),
        };
        statuses.insert(key.url.clone(), outcome);
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationCounter;
    use crate::reference::ReferenceKind;
    use crate::status::{IssueState, StateKind};
    use crate::test_utils::mock_tracker::MockTracker;

    fn key(n: u64) -> IssueKey {
        IssueKey::new("github.com", "acme", "widgets", ReferenceKind::Issue, n)
    }

    fn closed(title: &str) -> IssueState {
        IssueState::new(StateKind::Closed, title)
    }

    fn fetcher(mock: Arc<MockTracker>) -> StatusFetcher {
        StatusFetcher::new(
            mock,
            Arc::new(StatusCache::new(Duration::from_secs(60))),
            4,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_two_cached_one_fetched() {
        let mock = Arc::new(MockTracker::new().with_state(&key(3).url, closed("three")));
        let fetcher = fetcher(mock.clone());
        fetcher.cache().set(key(1).url, closed("one"));
        fetcher.cache().set(key(2).url, closed("two"));

        let keys = vec![key(1), key(2), key(3)];
        let result = fetcher.fetch_batch(&keys, &GenerationToken::detached()).await;

        assert_eq!(mock.total_calls(), 1);
        assert_eq!(mock.calls_for(&key(3).url), 1);
        assert_eq!(result.len(), 3);
        let urls: Vec<_> = result.keys().cloned().collect();
        assert_eq!(urls, vec![key(1).url, key(2).url, key(3).url]);
        assert_eq!(result[&key(3).url].as_ref().unwrap().title, "three");
        assert!(fetcher.cache().has(&key(3).url));
    }

    #[tokio::test]
    async fn test_all_cached_makes_no_calls() {
        let mock = Arc::new(MockTracker::new());
        let fetcher = fetcher(mock.clone());
        fetcher.cache().set(key(1).url, closed("one"));

        let result = fetcher.fetch_batch(&[key(1)], &GenerationToken::detached()).await;
        assert_eq!(mock.total_calls(), 0);
        assert!(result[&key(1).url].is_ok());
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let mock = Arc::new(
            MockTracker::new()
                .with_state(&key(1).url, closed("ok"))
                .with_error(&key(2).url, FetchError::Unauthorized("rate limited".into())),
        );
        let fetcher = fetcher(mock.clone());

        let keys = vec![key(1), key(2), key(3)];
        let result = fetcher.fetch_batch(&keys, &GenerationToken::detached()).await;

        assert_eq!(result.len(), 3);
        assert!(result[&key(1).url].is_ok());
        assert_eq!(
            result[&key(2).url].as_ref().unwrap_err().category(),
            "unauthorized"
        );
        // Unscripted URLs resolve as not found
        assert_eq!(result[&key(3).url], Err(FetchError::NotFound));
        // Only successes are cached
        assert!(fetcher.cache().has(&key(1).url));
        assert!(!fetcher.cache().has(&key(2).url));
        assert_eq!(fetcher.cache().size(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_keys_fetched_once() {
        let mock = Arc::new(MockTracker::new().with_state(&key(1).url, closed("one")));
        let fetcher = fetcher(mock.clone());
        let result = fetcher
            .fetch_batch(&[key(1), key(1)], &GenerationToken::detached())
            .await;
        assert_eq!(mock.total_calls(), 1);
        assert_eq!(result.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reported_per_item() {
        let mock = Arc::new(
            MockTracker::new()
                .with_state(&key(1).url, closed("slow"))
                .with_state(&key(2).url, closed("fast"))
                .with_delay_for(&key(1).url, Duration::from_secs(60)),
        );
        let fetcher = fetcher(mock);
        let result = fetcher
            .fetch_batch(&[key(1), key(2)], &GenerationToken::detached())
            .await;
        assert_eq!(
            result[&key(1).url],
            Err(FetchError::Timeout(Duration::from_secs(5)))
        );
        assert!(result[&key(2).url].is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_batches_share_in_flight_fetch() {
        let mock = Arc::new(
            MockTracker::new()
                .with_state(&key(1).url, closed("one"))
                .with_delay(Duration::from_millis(500)),
        );
        let fetcher = fetcher(mock.clone());
        let token = GenerationToken::detached();

        let keys = [key(1)];
        let (a, b) = tokio::join!(
            fetcher.fetch_batch(&keys, &token),
            fetcher.fetch_batch(&keys, &token)
        );

        assert_eq!(mock.calls_for(&key(1).url), 1);
        assert_eq!(a[&key(1).url], b[&key(1).url]);
        assert!(a[&key(1).url].is_ok());
        assert_eq!(fetcher.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_batch_does_not_fail_sharing_batch() {
        let mock = Arc::new(
            MockTracker::new()
                .with_state(&key(1).url, closed("one"))
                .with_delay(Duration::from_millis(500)),
        );
        let fetcher = Arc::new(fetcher(mock.clone()));

        let owner = tokio::spawn({
            let fetcher = fetcher.clone();
            async move {
                fetcher
                    .fetch_batch(&[key(1)], &GenerationToken::detached())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.in_flight_count(), 1);

        let sharer = tokio::spawn({
            let fetcher = fetcher.clone();
            async move {
                fetcher
                    .fetch_batch(&[key(1)], &GenerationToken::detached())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        owner.abort();
        assert!(owner.await.unwrap_err().is_cancelled());

        let result = sharer.await.unwrap();
        assert_eq!(result[&key(1).url].as_ref().unwrap().title, "one");
        assert_eq!(mock.calls_for(&key(1).url), 1);
        assert_eq!(fetcher.in_flight_count(), 0);
        // The surviving batch still populates the cache
        assert!(fetcher.cache().has(&key(1).url));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let mut mock = MockTracker::new().with_delay(Duration::from_millis(100));
        for n in 1..=10 {
            mock = mock.with_state(&key(n).url, closed("x"));
        }
        let mock = Arc::new(mock);
        let fetcher = StatusFetcher::new(
            mock.clone(),
            Arc::new(StatusCache::default()),
            3,
            Duration::from_secs(5),
        );

        let keys: Vec<_> = (1..=10).map(key).collect();
        let result = fetcher.fetch_batch(&keys, &GenerationToken::detached()).await;
        assert_eq!(result.len(), 10);
        assert!(mock.max_concurrency() <= 3);
        assert_eq!(mock.total_calls(), 10);
    }

    #[tokio::test]
    async fn test_superseded_generation_skips_cache_writes() {
        let mock = Arc::new(MockTracker::new().with_state(&key(1).url, closed("one")));
        let fetcher = fetcher(mock);
        let counter = GenerationCounter::new();
        let token = counter.token();
        counter.advance();

        let result = fetcher.fetch_batch(&[key(1)], &token).await;
        assert!(result[&key(1).url].is_ok());
        assert_eq!(fetcher.cache().size(), 0);
    }

    #[tokio::test]
    async fn test_panicking_client_yields_explicit_error() {
        let mock = Arc::new(
            MockTracker::new()
                .with_state(&key(2).url, closed("two"))
                .with_panic(&key(1).url),
        );
        let fetcher = fetcher(mock);
        let result = fetcher
            .fetch_batch(&[key(1), key(2)], &GenerationToken::detached())
            .await;
        assert_eq!(result.len(), 2);
        assert_eq!(result[&key(1).url].as_ref().unwrap_err().category(), "transport");
        assert!(result[&key(2).url].is_ok());
        assert_eq!(fetcher.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_merged_issue_normalized_before_caching() {
        let mock = Arc::new(
            MockTracker::new().with_state(&key(1).url, IssueState::new(StateKind::Merged, "m")),
        );
        let fetcher = fetcher(mock);
        let result = fetcher.fetch_batch(&[key(1)], &GenerationToken::detached()).await;
        assert_eq!(result[&key(1).url].as_ref().unwrap().state, StateKind::Closed);
    }
}
