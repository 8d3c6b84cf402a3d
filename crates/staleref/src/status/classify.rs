//
// status/classify.rs
//
// Staleness tiers
//

use serde::Serialize;

use super::{IssueState, StateKind};

/// Urgency of a reference. Ordering is ranking order: stale sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Resolved, and the comment marks a workaround
    Stale,
    /// Resolved
    Closed,
    /// Still open, or closed as not planned
    Open,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Stale => "stale",
            Tier::Closed => "closed",
            Tier::Open => "open",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a resolved state.
///
/// An item counts as resolved when it is closed or merged, unless it was
/// closed as `not_planned`: the upstream fix will never land, so the comment
/// still describes a live workaround and stays `Open`.
pub fn classify(state: &IssueState, has_stale_keyword: bool) -> Tier {
    let resolved = matches!(state.state, StateKind::Closed | StateKind::Merged)
        && !state.is_not_planned();

    if resolved && has_stale_keyword {
        Tier::Stale
    } else if resolved {
        Tier::Closed
    } else {
        Tier::Open
    }
}
