//
// scan/debounce.rs
//
// Per-target scheduling and phase tracking
//

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::providers::BufferId;

/// What a scan runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanTarget {
    Buffer(BufferId),
    Workspace,
}

/// Lifecycle of one target: `Idle → Pending → Scanning → Resolving → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    /// Waiting out the debounce delay
    Pending,
    /// Extracting references
    Scanning,
    /// Waiting on tracker statuses
    Resolving,
}

/// Handle for one scheduled run of a target
#[derive(Debug, Clone)]
pub struct ScheduledScan {
    pub target: ScanTarget,
    pub token: CancellationToken,
    /// Distinguishes this run from later ones for the same target
    pub ticket: u64,
}

impl ScheduledScan {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct TargetState {
    token: CancellationToken,
    ticket: u64,
    phase: ScanPhase,
}

#[derive(Debug, Default)]
struct Inner {
    targets: HashMap<ScanTarget, TargetState>,
    next_ticket: u64,
}

/// Tracks pending work per target.
///
/// Scheduling a target cancels only that target's previous run. Phase updates
/// and completion carry the run's ticket so a superseded run can never touch
/// the state of its replacement.
#[derive(Debug, Default)]
pub struct ScanScheduler {
    inner: RwLock<Inner>,
}

impl ScanScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Schedule a run for a target, cancelling any pending or running one.
    pub fn schedule(&self, target: ScanTarget) -> ScheduledScan {
        let mut inner = self.write();
        inner.next_ticket += 1;
        let ticket = inner.next_ticket;
        if let Some(old) = inner.targets.remove(&target) {
            log::trace!("Superseding run {} for {:?}", old.ticket, target);
            old.token.cancel();
        }
        let token = CancellationToken::new();
        inner.targets.insert(
            target,
            TargetState {
                token: token.clone(),
                ticket,
                phase: ScanPhase::Pending,
            },
        );
        ScheduledScan {
            target,
            token,
            ticket,
        }
    }

    /// Move a run to a new phase. Returns false if the run was superseded.
    pub fn set_phase(&self, scan: &ScheduledScan, phase: ScanPhase) -> bool {
        let mut inner = self.write();
        match inner.targets.get_mut(&scan.target) {
            Some(state) if state.ticket == scan.ticket => {
                state.phase = phase;
                true
            }
            _ => false,
        }
    }

    /// Mark a run as finished, returning its target to idle
    pub fn complete(&self, scan: &ScheduledScan) {
        let mut inner = self.write();
        if inner
            .targets
            .get(&scan.target)
            .is_some_and(|state| state.ticket == scan.ticket)
        {
            inner.targets.remove(&scan.target);
        }
    }

    /// Cancel and forget a target's run
    pub fn cancel(&self, target: ScanTarget) {
        if let Some(state) = self.write().targets.remove(&target) {
            state.token.cancel();
        }
    }

    /// Cancel every run. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.write();
        let count = inner.targets.len();
        for (_, state) in inner.targets.drain() {
            state.token.cancel();
        }
        count
    }

    pub fn phase(&self, target: ScanTarget) -> ScanPhase {
        self.read()
            .targets
            .get(&target)
            .map(|state| state.phase)
            .unwrap_or(ScanPhase::Idle)
    }

    /// Number of targets not idle
    pub fn active_count(&self) -> usize {
        self.read().targets.len()
    }
}
