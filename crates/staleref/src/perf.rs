// perf.rs - Timing instrumentation for scans
//
// Controlled via the STALEREF_PERF environment variable.
//
// Usage:
//   STALEREF_PERF=1 staleref           # Log scan phase timings
//   STALEREF_PERF=verbose staleref     # Also warn when phases exceed thresholds

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("STALEREF_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("STALEREF_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII timing guard that logs duration on drop
///
/// ```
/// use staleref::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("resolve_statuses");
/// // ... do work ...
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Warn (in verbose mode) when the scope outlives `threshold_ms`
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            threshold_warn_ms: Some(threshold_ms),
            ..Self::new(name)
        }
    }

    /// Consume the guard without logging and return the duration, for phases
    /// whose timing is reported through [`ScanMetrics`] instead
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        std::mem::forget(self);
        elapsed
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

/// Phase timings for one workspace scan
#[derive(Debug, Default, Clone)]
pub struct ScanMetrics {
    pub listing_duration: Option<Duration>,
    pub extraction_duration: Option<Duration>,
    pub resolution_duration: Option<Duration>,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub references_found: usize,
    pub distinct_urls: usize,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_summary(&self) {
        if !is_enabled() {
            return;
        }

        log::info!("[PERF] === Workspace Scan Summary ===");
        if let Some(d) = self.listing_duration {
            log::info!("[PERF] File listing: {:?}", d);
        }
        if let Some(d) = self.extraction_duration {
            log::info!(
                "[PERF] Extraction: {:?} ({} files, {} skipped, {} references)",
                d,
                self.files_scanned,
                self.files_skipped,
                self.references_found
            );
        }
        if let Some(d) = self.resolution_duration {
            log::info!("[PERF] Status resolution: {:?} ({} urls)", d, self.distinct_urls);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_guard_finish() {
        let guard = TimingGuard::with_threshold("test", 1);
        std::thread::sleep(Duration::from_millis(10));
        assert!(guard.finish().as_millis() >= 10);
    }

    #[test]
    fn test_scan_metrics_default() {
        let metrics = ScanMetrics::new();
        assert!(metrics.listing_duration.is_none());
        assert_eq!(metrics.files_scanned, 0);
        metrics.log_summary();
    }
}
