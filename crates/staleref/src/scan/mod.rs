//
// scan/mod.rs
//
// Scan orchestration: debounced buffer scans and batched workspace scans
//

pub mod buffer;
pub mod debounce;
pub mod results;
pub mod workspace;

pub use debounce::{ScanPhase, ScanScheduler, ScanTarget, ScheduledScan};
pub use results::{group_references, rank_entries, resolve_entries, Occurrence, WorkspaceEntry};
pub use workspace::{ScanError, ScanProgress, SkipReason, WorkspaceOutcome, WorkspaceReport};

use std::sync::{Arc, RwLock};

use crate::config::StaleRefConfig;
use crate::generation::{GenerationCounter, GenerationToken};
use crate::providers::{AnnotationSink, BufferId, BufferSource, CommentSpanProvider};
use crate::reference::ReferenceExtractor;
use crate::status::{StatusCache, StatusFetcher};
use crate::tracker::TrackerClient;

/// Configuration-derived components, swapped as a unit on reconfigure
#[derive(Debug, Clone)]
pub(crate) struct Engine {
    pub config: Arc<StaleRefConfig>,
    pub extractor: Arc<ReferenceExtractor>,
    pub fetcher: Arc<StatusFetcher>,
}

impl Engine {
    fn build(config: StaleRefConfig, client: Arc<dyn TrackerClient>, cache: Option<Arc<StatusCache>>) -> Self {
        let cache = cache.unwrap_or_else(|| Arc::new(StatusCache::new(config.ttl())));
        let fetcher = StatusFetcher::new(
            client,
            cache,
            config.max_concurrent_fetches,
            config.fetch_timeout(),
        );
        Self {
            extractor: Arc::new(ReferenceExtractor::from_config(&config)),
            fetcher: Arc::new(fetcher),
            config: Arc::new(config),
        }
    }
}

/// Where per-buffer scans read text and send results
#[derive(Clone)]
pub(crate) struct BufferHost {
    pub source: Arc<dyn BufferSource>,
    pub sink: Arc<dyn AnnotationSink>,
}

struct SessionInner {
    engine: RwLock<Engine>,
    client: Arc<dyn TrackerClient>,
    spans: Arc<dyn CommentSpanProvider>,
    buffers: RwLock<Option<BufferHost>>,
    generation: GenerationCounter,
    scheduler: ScanScheduler,
}

/// Owns everything a scan needs: configuration, the status cache, the
/// generation counter and per-target scheduling.
///
/// Cheap to clone; clones share state. Spawned scan tasks hold a clone.
#[derive(Clone)]
pub struct ScanSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("generation", &self.inner.generation.current())
            .field("active_targets", &self.inner.scheduler.active_count())
            .finish_non_exhaustive()
    }
}

impl ScanSession {
    pub fn new(
        config: StaleRefConfig,
        client: Arc<dyn TrackerClient>,
        spans: Arc<dyn CommentSpanProvider>,
    ) -> Self {
        let engine = Engine::build(config, client.clone(), None);
        Self {
            inner: Arc::new(SessionInner {
                engine: RwLock::new(engine),
                client,
                spans,
                buffers: RwLock::new(None),
                generation: GenerationCounter::new(),
                scheduler: ScanScheduler::new(),
            }),
        }
    }

    /// Connect the per-buffer path to the host's buffers and renderer
    pub fn attach_buffers(&self, source: Arc<dyn BufferSource>, sink: Arc<dyn AnnotationSink>) {
        let mut buffers = self.inner.buffers.write().unwrap_or_else(|p| p.into_inner());
        *buffers = Some(BufferHost { source, sink });
    }

    pub(crate) fn engine(&self) -> Engine {
        self.inner
            .engine
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub(crate) fn buffer_host(&self) -> Option<BufferHost> {
        self.inner
            .buffers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub(crate) fn scheduler(&self) -> &ScanScheduler {
        &self.inner.scheduler
    }

    pub(crate) fn spans(&self) -> &Arc<dyn CommentSpanProvider> {
        &self.inner.spans
    }

    pub fn config(&self) -> Arc<StaleRefConfig> {
        self.engine().config
    }

    pub fn cache(&self) -> Arc<StatusCache> {
        self.engine().fetcher.cache().clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.current()
    }

    pub(crate) fn generation_token(&self) -> GenerationToken {
        self.inner.generation.token()
    }

    pub fn phase(&self, target: ScanTarget) -> ScanPhase {
        self.inner.scheduler.phase(target)
    }

    pub fn buffer_phase(&self, buffer: BufferId) -> ScanPhase {
        self.phase(ScanTarget::Buffer(buffer))
    }

    /// Cancel all pending work and start a new generation.
    ///
    /// Work already past its debounce delay keeps running but discards its
    /// results when it next checks the generation.
    pub fn reset(&self) {
        let cancelled = self.inner.scheduler.cancel_all();
        let generation = self.inner.generation.advance();
        log::debug!(
            "Scan session reset: generation {}, {} pending targets cancelled",
            generation,
            cancelled
        );
    }

    /// Apply new configuration, then [`reset`](Self::reset).
    ///
    /// The status cache survives unless a setting baked into it (TTL, fetch
    /// concurrency, fetch timeout) changed.
    pub fn reconfigure(&self, config: StaleRefConfig) {
        {
            let mut engine = self.inner.engine.write().unwrap_or_else(|p| p.into_inner());
            let keep_cache = !engine.config.fetch_settings_changed(&config);
            let cache = keep_cache.then(|| engine.fetcher.cache().clone());
            log::info!(
                "Reconfiguring scan session ({})",
                if keep_cache { "status cache kept" } else { "status cache rebuilt" }
            );
            *engine = Engine::build(config, self.inner.client.clone(), cache);
        }
        self.reset();
    }

    /// Forget a buffer, cancelling any scan pending for it
    pub fn detach(&self, buffer: BufferId) {
        log::trace!("Detaching {}", buffer);
        self.inner.scheduler.cancel(ScanTarget::Buffer(buffer));
    }

    /// Evict expired status entries. Returns how many were removed.
    pub fn prune_cache(&self) -> usize {
        let removed = self.cache().prune();
        if removed > 0 {
            log::debug!("Pruned {} expired status entries", removed);
        }
        removed
    }
}
