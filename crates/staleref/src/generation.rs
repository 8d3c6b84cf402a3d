//
// generation.rs
//
// Session epochs used to invalidate in-flight async work
//

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic epoch counter owned by a scan session.
///
/// Advancing the counter does not cancel anything. Work that captured an
/// older [`GenerationToken`] notices on its next check and drops its results.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    live: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.live.load(Ordering::Acquire)
    }

    /// Start a new epoch. Returns the new generation.
    pub fn advance(&self) -> u64 {
        self.live.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Capture the current epoch
    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            captured: self.current(),
            live: self.live.clone(),
        }
    }
}

/// Epoch captured at the start of an async chain
#[derive(Debug, Clone)]
pub struct GenerationToken {
    captured: u64,
    live: Arc<AtomicU64>,
}

impl GenerationToken {
    pub fn generation(&self) -> u64 {
        self.captured
    }

    /// False once the owning counter has advanced past the captured epoch
    pub fn is_current(&self) -> bool {
        self.live.load(Ordering::Acquire) == self.captured
    }

    /// A token that never goes stale, for one-shot callers with no session
    pub fn detached() -> Self {
        GenerationCounter::new().token()
    }
}
