//
// scan/buffer.rs
//
// Debounced per-buffer scans
//

use indexmap::IndexSet;
use tokio::task::JoinHandle;

use super::{ScanPhase, ScanSession, ScanTarget, ScheduledScan};
use crate::providers::{Annotation, BufferId};
use crate::status::classify;

impl ScanSession {
    /// Request a scan of a buffer after the debounce delay.
    ///
    /// Each call restarts the buffer's delay; only the last of a burst of
    /// triggers runs. Other buffers are unaffected. The returned handle
    /// resolves when this run finishes or is superseded.
    pub fn trigger_buffer(&self, buffer: BufferId) -> JoinHandle<()> {
        let scan = self.scheduler().schedule(ScanTarget::Buffer(buffer));
        let delay = self.config().debounce();
        let session = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = scan.token.cancelled() => {
                    log::trace!("Debounced scan of {} superseded", buffer);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            session.run_buffer_scan(buffer, &scan).await;
            session.scheduler().complete(&scan);
        })
    }

    async fn run_buffer_scan(&self, buffer: BufferId, scan: &ScheduledScan) {
        let generation = self.generation_token();
        let Some(host) = self.buffer_host() else {
            log::warn!("Buffer scan requested with no buffer source attached");
            return;
        };
        if !host.source.is_valid(buffer) {
            log::trace!("{} closed before scan", buffer);
            return;
        }
        let Some(snapshot) = host.source.snapshot(buffer) else {
            return;
        };
        if !self.scheduler().set_phase(scan, ScanPhase::Scanning) {
            return;
        }

        let engine = self.engine();
        let spans = self.spans().spans(&snapshot.text, snapshot.language.as_deref());
        let references = engine.extractor.extract_all(&spans);

        if references.is_empty() {
            if generation.is_current() && !scan.is_cancelled() && host.source.is_valid(buffer) {
                host.sink.clear(buffer);
            }
            return;
        }

        if !self.scheduler().set_phase(scan, ScanPhase::Resolving) {
            return;
        }
        let mut seen = IndexSet::new();
        let keys: Vec<_> = references
            .iter()
            .filter(|r| seen.insert(r.url()))
            .map(|r| r.key.clone())
            .collect();
        let statuses = engine.fetcher.fetch_batch(&keys, &generation).await;

        if !generation.is_current() || scan.is_cancelled() {
            log::trace!("Discarding results for {}: superseded while resolving", buffer);
            return;
        }
        if !host.source.is_valid(buffer) {
            log::trace!("{} closed while resolving", buffer);
            return;
        }

        let annotations: Vec<Annotation> = references
            .iter()
            .filter_map(|reference| match statuses.get(reference.url()) {
                Some(Ok(state)) => Some(Annotation::new(
                    reference,
                    state.clone(),
                    classify(state, reference.has_stale_keyword),
                )),
                Some(Err(e)) => {
                    log::debug!("Leaving {} unannotated: {}", reference.url(), e);
                    None
                }
                None => None,
            })
            .collect();

        log::trace!("Rendering {} annotations in {}", annotations.len(), buffer);
        host.sink.render(buffer, annotations);
    }
}
