//
// status/mod.rs
//
// Resolved tracker state, caching, batch fetching and classification
//

pub mod cache;
pub mod classify;
pub mod fetch;

pub use cache::*;
pub use classify::*;
pub use fetch::*;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::reference::ReferenceKind;

/// `state_reason` reported when the owner declined to fix an issue
pub const NOT_PLANNED: &str = "not_planned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Open,
    Closed,
    Merged,
    Unknown,
}

impl StateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StateKind::Open => "open",
            StateKind::Closed => "closed",
            StateKind::Merged => "merged",
            StateKind::Unknown => "unknown",
        }
    }
}

/// Resolved status of one tracker item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueState {
    pub state: StateKind,
    pub state_reason: Option<String>,
    pub title: String,
    pub labels: BTreeSet<String>,
    pub closed_at: Option<String>,
    pub merged_at: Option<String>,
}

impl IssueState {
    pub fn new(state: StateKind, title: impl Into<String>) -> Self {
        Self {
            state,
            state_reason: None,
            title: title.into(),
            labels: BTreeSet::new(),
            closed_at: None,
            merged_at: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.state_reason = Some(reason.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Enforce that only pull requests can be merged.
    ///
    /// A tracker that reports `merged` for an issue is treated as having
    /// reported `closed`.
    pub fn normalized_for(mut self, kind: ReferenceKind) -> Self {
        if kind == ReferenceKind::Issue && self.state == StateKind::Merged {
            log::warn!("Tracker reported a merged issue ({}); treating as closed", self.title);
            self.state = StateKind::Closed;
        }
        self
    }

    pub fn is_not_planned(&self) -> bool {
        self.state_reason.as_deref() == Some(NOT_PLANNED)
    }
}
