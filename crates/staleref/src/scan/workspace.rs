//
// scan/workspace.rs
//
// Batched scan of every tracked file in a workspace
//

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::results::{group_references, rank_entries, resolve_entries, WorkspaceEntry};
use super::{ScanPhase, ScanSession, ScanTarget, ScheduledScan};
use crate::generation::GenerationToken;
use crate::perf::{ScanMetrics, TimingGuard};
use crate::providers::comments::language_for_path;
use crate::providers::{CommentSpanProvider, FileLister};
use crate::reference::{Reference, ReferenceExtractor};

/// Bytes inspected for a null byte when deciding whether a file is binary
pub const BINARY_PROBE_BYTES: usize = 8000;

/// Failures that abort a workspace scan as a whole
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to list workspace files: {0}")]
    ListingFailed(String),
    #[error("no files to scan")]
    NoFiles,
}

/// Progress through a workspace scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub files_done: usize,
    pub files_total: usize,
    pub batches_done: usize,
    pub batches_total: usize,
    pub references_found: usize,
}

impl ScanProgress {
    pub fn is_final(&self) -> bool {
        self.batches_done == self.batches_total
    }
}

/// Why a file contributed nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge,
    Binary,
    Unreadable,
    /// The scan task ended without reporting
    Abandoned,
}

#[derive(Debug)]
enum FileOutcome {
    Scanned(Vec<Reference>),
    Skipped(SkipReason),
}

/// Completed workspace scan
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceReport {
    /// Ranked: stale, closed, open, then unresolved
    pub entries: Vec<WorkspaceEntry>,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub references_found: usize,
}

#[derive(Debug, Clone)]
pub enum WorkspaceOutcome {
    Completed(WorkspaceReport),
    /// A reset or a newer workspace scan took over before results were ready
    Superseded,
}

/// Sends exactly one completion per file, even if the file's task panics or
/// is dropped before reporting.
struct CompletionSender {
    index: usize,
    tx: Option<mpsc::UnboundedSender<(usize, FileOutcome)>>,
}

impl CompletionSender {
    fn send(mut self, outcome: FileOutcome) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send((self.index, outcome));
        }
    }
}

impl Drop for CompletionSender {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send((self.index, FileOutcome::Skipped(SkipReason::Abandoned)));
        }
    }
}

/// Limits progress callbacks to one per interval; the first report always
/// passes, as does any forced report.
struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    fn should_emit(&mut self, force: bool) -> bool {
        let now = Instant::now();
        let due = match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if due || force {
            self.last = Some(now);
            true
        } else {
            false
        }
    }
}

/// What a file task needs, detached from the session
#[derive(Clone)]
struct FileScanContext {
    extractor: Arc<ReferenceExtractor>,
    spans: Arc<dyn CommentSpanProvider>,
    max_file_size: u64,
}

async fn scan_file(ctx: &FileScanContext, path: &Path) -> FileOutcome {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) => {
            log::trace!("Skipping {}: {}", path.display(), e);
            return FileOutcome::Skipped(SkipReason::Unreadable);
        }
    };
    if metadata.len() > ctx.max_file_size {
        log::trace!("Skipping {}: {} bytes exceeds limit", path.display(), metadata.len());
        return FileOutcome::Skipped(SkipReason::TooLarge);
    }

    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            log::trace!("Skipping {}: {}", path.display(), e);
            return FileOutcome::Skipped(SkipReason::Unreadable);
        }
    };
    if bytes.iter().take(BINARY_PROBE_BYTES).any(|b| *b == 0) {
        return FileOutcome::Skipped(SkipReason::Binary);
    }
    let Ok(text) = String::from_utf8(bytes) else {
        log::trace!("Skipping {}: not UTF-8", path.display());
        return FileOutcome::Skipped(SkipReason::Binary);
    };

    let spans = ctx.spans.spans(&text, language_for_path(path));
    FileOutcome::Scanned(ctx.extractor.extract_all(&spans))
}

fn is_superseded(generation: &GenerationToken, scan: &ScheduledScan) -> bool {
    !generation.is_current() || scan.is_cancelled()
}

impl ScanSession {
    /// Scan every file the lister returns, then resolve and rank the results.
    ///
    /// Files are processed in fixed-size batches, strictly one batch after
    /// another; files within a batch are scanned concurrently. `on_progress`
    /// is called at batch boundaries, at most once per configured interval,
    /// and always for the final batch.
    pub async fn scan_workspace<F>(
        &self,
        lister: &dyn FileLister,
        mut on_progress: F,
    ) -> Result<WorkspaceOutcome, ScanError>
    where
        F: FnMut(ScanProgress) + Send,
    {
        let _timing = TimingGuard::with_threshold("workspace_scan", 5_000);
        let generation = self.generation_token();
        let scan = self.scheduler().schedule(ScanTarget::Workspace);
        let outcome = self.run_workspace_scan(lister, &mut on_progress, &generation, &scan).await;
        self.scheduler().complete(&scan);
        outcome
    }

    async fn run_workspace_scan<F>(
        &self,
        lister: &dyn FileLister,
        on_progress: &mut F,
        generation: &GenerationToken,
        scan: &ScheduledScan,
    ) -> Result<WorkspaceOutcome, ScanError>
    where
        F: FnMut(ScanProgress) + Send,
    {
        let engine = self.engine();
        let mut metrics = ScanMetrics::new();

        let listing = TimingGuard::new("file_listing");
        let files = lister
            .list_tracked_files()
            .await
            .map_err(|e| ScanError::ListingFailed(format!("{e:#}")))?;
        metrics.listing_duration = Some(listing.finish());
        if files.is_empty() {
            return Err(ScanError::NoFiles);
        }
        if is_superseded(generation, scan) || !self.scheduler().set_phase(scan, ScanPhase::Scanning) {
            return Ok(WorkspaceOutcome::Superseded);
        }

        let ctx = FileScanContext {
            extractor: engine.extractor.clone(),
            spans: self.spans().clone(),
            max_file_size: engine.config.max_file_size_bytes,
        };
        let batch_size = engine.config.effective_batch_size();
        let files_total = files.len();
        let batches_total = files_total.div_ceil(batch_size);
        log::info!(
            "Scanning {} files in {} batches of up to {}",
            files_total,
            batches_total,
            batch_size
        );

        let extraction = TimingGuard::new("extraction");
        let mut outcomes: Vec<Option<FileOutcome>> = (0..files_total).map(|_| None).collect();
        let mut throttle = ProgressThrottle::new(engine.config.progress_interval());
        let mut files_done = 0;
        let mut references_found = 0;

        for (batch_index, batch) in files.chunks(batch_size).enumerate() {
            if is_superseded(generation, scan) {
                log::debug!("Workspace scan superseded after {} batches", batch_index);
                return Ok(WorkspaceOutcome::Superseded);
            }

            let (tx, mut rx) = mpsc::unbounded_channel();
            for (offset, path) in batch.iter().enumerate() {
                let sender = CompletionSender {
                    index: batch_index * batch_size + offset,
                    tx: Some(tx.clone()),
                };
                let ctx = ctx.clone();
                let path = path.clone();
                tokio::spawn(async move {
                    let outcome = scan_file(&ctx, &path).await;
                    sender.send(outcome);
                });
            }
            drop(tx);

            // Every sender reports exactly once, so this drains the batch
            while let Some((index, outcome)) = rx.recv().await {
                files_done += 1;
                if let FileOutcome::Scanned(refs) = &outcome {
                    references_found += refs.len();
                }
                outcomes[index] = Some(outcome);
            }

            let progress = ScanProgress {
                files_done,
                files_total,
                batches_done: batch_index + 1,
                batches_total,
                references_found,
            };
            if throttle.should_emit(progress.is_final()) {
                on_progress(progress);
            }
            tokio::task::yield_now().await;
        }
        metrics.extraction_duration = Some(extraction.finish());

        if is_superseded(generation, scan) || !self.scheduler().set_phase(scan, ScanPhase::Resolving) {
            return Ok(WorkspaceOutcome::Superseded);
        }

        // File-list order, then position within the file
        let mut found: Vec<(PathBuf, Reference)> = Vec::with_capacity(references_found);
        for (path, outcome) in files.into_iter().zip(outcomes) {
            match outcome {
                Some(FileOutcome::Scanned(refs)) => {
                    metrics.files_scanned += 1;
                    found.extend(refs.into_iter().map(|r| (path.clone(), r)));
                }
                Some(FileOutcome::Skipped(reason)) => {
                    log::trace!("Skipped {} ({:?})", path.display(), reason);
                    metrics.files_skipped += 1;
                }
                None => metrics.files_skipped += 1,
            }
        }
        metrics.references_found = found.len();

        let mut entries = group_references(found);
        metrics.distinct_urls = entries.len();
        let keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();

        let resolution = TimingGuard::new("status_resolution");
        let statuses = engine.fetcher.fetch_batch(&keys, generation).await;
        metrics.resolution_duration = Some(resolution.finish());

        if is_superseded(generation, scan) {
            log::debug!("Workspace scan superseded while resolving statuses");
            return Ok(WorkspaceOutcome::Superseded);
        }

        resolve_entries(&mut entries, &statuses);
        rank_entries(&mut entries);
        metrics.log_summary();
        log::info!(
            "Workspace scan complete: {} references to {} items in {} files ({} skipped)",
            metrics.references_found,
            metrics.distinct_urls,
            metrics.files_scanned,
            metrics.files_skipped
        );

        Ok(WorkspaceOutcome::Completed(WorkspaceReport {
            entries,
            files_scanned: metrics.files_scanned,
            files_skipped: metrics.files_skipped,
            references_found: metrics.references_found,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaleRefConfig;
    use crate::providers::MarkerCommentSpans;
    use crate::status::{IssueState, StateKind, Tier};
    use crate::test_utils::mock_tracker::MockTracker;
    use crate::test_utils::StaticFileLister;
    use std::fs;
    use tempfile::TempDir;

    fn url(n: u64) -> String {
        format!("https://github.com/acme/widgets/issues/{n}")
    }

    fn session(mock: Arc<MockTracker>, config: StaleRefConfig) -> ScanSession {
        ScanSession::new(config, mock, Arc::new(MarkerCommentSpans))
    }

    fn write(dir: &TempDir, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_scan_groups_classifies_and_ranks() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.rs", format!("// see {}\n// TODO drop after {}\n", url(1), url(2)));
        let b = write(&dir, "b.py", format!("x = 1  # {}\n", url(1)));

        let mock = Arc::new(
            MockTracker::new()
                .with_state(&url(1), IssueState::new(StateKind::Open, "still open"))
                .with_state(&url(2), IssueState::new(StateKind::Closed, "fixed")),
        );
        let session = session(mock.clone(), StaleRefConfig::default());
        let lister = StaticFileLister::new(vec![a.clone(), b.clone()]);

        let outcome = session.scan_workspace(&lister, |_| {}).await.unwrap();
        let WorkspaceOutcome::Completed(report) = outcome else {
            panic!("scan should complete");
        };

        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.references_found, 3);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].url(), url(2));
        assert_eq!(report.entries[0].tier, Some(Tier::Stale));
        assert_eq!(report.entries[1].url(), url(1));
        assert_eq!(report.entries[1].occurrences.len(), 2);
        assert_eq!(report.entries[1].occurrences[0].path, a);
        assert_eq!(report.entries[1].occurrences[1].path, b);
        assert_eq!(mock.total_calls(), 2);
        assert_eq!(session.phase(ScanTarget::Workspace), ScanPhase::Idle);
    }

    #[tokio::test]
    async fn test_skips_binary_large_and_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let text = write(&dir, "ok.rs", format!("// {}\n", url(1)));
        let mut binary = format!("// {}\n", url(2)).into_bytes();
        binary.push(0);
        let binary = write(&dir, "bin.dat", binary);
        let large = write(&dir, "large.rs", format!("// {}\n{}", url(3), "x".repeat(2048)));
        let latin1 = write(&dir, "latin1.txt", b"// caf\xe9 https://github.com/acme/widgets/issues/4\n");
        let missing = dir.path().join("missing.rs");

        let mock = Arc::new(MockTracker::new().with_state(&url(1), IssueState::new(StateKind::Open, "")));
        let config = StaleRefConfig {
            max_file_size_bytes: 1024,
            ..StaleRefConfig::default()
        };
        let session = session(mock.clone(), config);
        let lister = StaticFileLister::new(vec![text, binary, large, latin1, missing]);

        let WorkspaceOutcome::Completed(report) = session.scan_workspace(&lister, |_| {}).await.unwrap()
        else {
            panic!("scan should complete");
        };
        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.files_skipped, 4);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(mock.total_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_final_batch() {
        let dir = TempDir::new().unwrap();
        let files: Vec<_> = (0..25)
            .map(|i| write(&dir, &format!("f{i}.rs"), format!("// {}\n", url(i + 1))))
            .collect();
        let session = session(Arc::new(MockTracker::new()), StaleRefConfig::default());
        let lister = StaticFileLister::new(files);

        let mut reports = Vec::new();
        let outcome = session
            .scan_workspace(&lister, |p| reports.push(p))
            .await
            .unwrap();

        // The paused clock never reaches the throttle interval between
        // batches, so only the first and the final report get through
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].files_done, 20);
        assert_eq!(reports[0].batches_done, 1);
        let last = reports.last().unwrap();
        assert!(last.is_final());
        assert_eq!(last.files_done, 25);
        assert_eq!(last.batches_total, 2);
        assert_eq!(last.references_found, 25);

        let WorkspaceOutcome::Completed(report) = outcome else {
            panic!("scan should complete");
        };
        // Unknown items fail individually and rank last, in discovery order
        assert_eq!(report.entries.len(), 25);
        assert!(report.entries.iter().all(|e| e.tier.is_none()));
        assert_eq!(report.entries[0].url(), url(1));
        assert_eq!(report.entries[24].url(), url(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_throttle() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        assert!(throttle.should_emit(false));
        assert!(!throttle.should_emit(false));
        assert!(throttle.should_emit(true));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(throttle.should_emit(false));
    }

    #[tokio::test]
    async fn test_listing_errors() {
        let session = session(Arc::new(MockTracker::new()), StaleRefConfig::default());

        let empty = StaticFileLister::new(Vec::new());
        assert!(matches!(
            session.scan_workspace(&empty, |_| {}).await,
            Err(ScanError::NoFiles)
        ));

        let failing = StaticFileLister::failing("not a git repository");
        let err = session.scan_workspace(&failing, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("not a git repository"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_supersedes_scan() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "a.rs", format!("// {}\n", url(1)));
        let mock = Arc::new(
            MockTracker::new()
                .with_state(&url(1), IssueState::new(StateKind::Closed, ""))
                .with_delay(Duration::from_secs(1)),
        );
        let session = session(mock, StaleRefConfig::default());
        let lister = StaticFileLister::new(vec![file]);

        let background = session.clone();
        let handle = tokio::spawn(async move { background.scan_workspace(&lister, |_| {}).await });
        while session.phase(ScanTarget::Workspace) != ScanPhase::Resolving {
            tokio::task::yield_now().await;
        }
        session.reset();

        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, WorkspaceOutcome::Superseded));
        assert_eq!(session.cache().size(), 0);
    }

    /// Holds back any file containing `HOLD` until every other file has been
    /// scanned, and records the order files finished in.
    struct HoldFirstSpans {
        others: usize,
        finished: std::sync::Mutex<Vec<bool>>,
    }

    impl CommentSpanProvider for HoldFirstSpans {
        fn spans(&self, text: &str, language: Option<&str>) -> Vec<crate::reference::CommentSpan> {
            let held = text.contains("HOLD");
            if held {
                let deadline = std::time::Instant::now() + Duration::from_secs(5);
                while self.finished.lock().unwrap().len() < self.others
                    && std::time::Instant::now() < deadline
                {
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
            let spans = MarkerCommentSpans.spans(text, language);
            self.finished.lock().unwrap().push(held);
            spans
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_out_of_order_completion_keeps_discovery_order() {
        let dir = TempDir::new().unwrap();
        let mut files = vec![write(
            &dir,
            "a.rs",
            format!("// HOLD {}
// {}
", url(1), url(5)),
        )];
        for n in 2..=5 {
            files.push(write(&dir, &format!("f{n}.rs"), format!("// {}
", url(n))));
        }

        let mut mock = MockTracker::new();
        for n in 1..=5 {
            mock = mock.with_state(&url(n), IssueState::new(StateKind::Open, format!("issue {n}")));
        }
        let spans = Arc::new(HoldFirstSpans {
            others: files.len() - 1,
            finished: std::sync::Mutex::new(Vec::new()),
        });
        let session = ScanSession::new(StaleRefConfig::default(), Arc::new(mock), spans.clone());
        let lister = StaticFileLister::new(files.clone());

        let mut reports = Vec::new();
        let WorkspaceOutcome::Completed(report) = session
            .scan_workspace(&lister, |p| reports.push(p))
            .await
            .unwrap()
        else {
            panic!("scan should complete");
        };

        // The first listed file finished last
        assert_eq!(
            *spans.finished.lock().unwrap(),
            vec![false, false, false, false, true]
        );

        let last = reports.last().unwrap();
        assert!(last.is_final());
        assert_eq!(last.files_done, 5);
        assert_eq!(last.references_found, 6);
        assert_eq!(report.files_scanned, 5);
        assert_eq!(report.references_found, 6);

        let order: Vec<_> = report.entries.iter().map(|e| e.key.number).collect();
        assert_eq!(order, vec![1, 5, 2, 3, 4]);
        let five = &report.entries[1];
        assert_eq!(five.occurrences[0].path, files[0]);
        assert_eq!(five.occurrences[1].path, files[4]);
    }

    #[tokio::test]
    async fn test_abandoned_sender_reports_skip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(CompletionSender { index: 3, tx: Some(tx) });
        let (index, outcome) = rx.recv().await.unwrap();
        assert_eq!(index, 3);
        assert!(matches!(outcome, FileOutcome::Skipped(SkipReason::Abandoned)));
    }
}
