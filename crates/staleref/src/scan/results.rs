//
// scan/results.rs
//
// Grouping, resolution and ranking of workspace scan results
//

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::reference::{IssueKey, Reference};
use crate::status::{classify, IssueState, StatusMap, Tier};
use crate::tracker::FetchError;

/// One place a tracker item is referenced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub path: PathBuf,
    pub line: usize,
    pub start_column: usize,
    pub end_column: usize,
    pub comment_text: String,
    pub has_stale_keyword: bool,
    /// Set once the status is known
    pub tier: Option<Tier>,
}

impl Occurrence {
    pub fn new(path: PathBuf, reference: &Reference) -> Self {
        Self {
            path,
            line: reference.line,
            start_column: reference.start_column,
            end_column: reference.end_column,
            comment_text: reference.comment_text.clone(),
            has_stale_keyword: reference.has_stale_keyword,
            tier: None,
        }
    }
}

fn serialize_error<S: Serializer>(error: &Option<FetchError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

/// Every occurrence of one tracker item, with its resolved status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceEntry {
    pub key: IssueKey,
    pub status: Option<IssueState>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<FetchError>,
    /// Most urgent tier among the occurrences; `None` while unresolved
    pub tier: Option<Tier>,
    pub occurrences: Vec<Occurrence>,
}

impl WorkspaceEntry {
    pub fn url(&self) -> &str {
        &self.key.url
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_some()
    }
}

/// Group references by canonical URL in discovery order.
///
/// Entry order follows each URL's first occurrence; occurrences keep the
/// order they were given in.
pub fn group_references<I>(found: I) -> Vec<WorkspaceEntry>
where
    I: IntoIterator<Item = (PathBuf, Reference)>,
{
    let mut groups: IndexMap<String, WorkspaceEntry> = IndexMap::new();
    for (path, reference) in found {
        let occurrence = Occurrence::new(path, &reference);
        groups
            .entry(reference.key.url.clone())
            .or_insert_with(|| WorkspaceEntry {
                key: reference.key,
                status: None,
                error: None,
                tier: None,
                occurrences: Vec::new(),
            })
            .occurrences
            .push(occurrence);
    }
    groups.into_values().collect()
}

/// Attach statuses and classify every occurrence
pub fn resolve_entries(entries: &mut [WorkspaceEntry], statuses: &StatusMap) {
    for entry in entries.iter_mut() {
        match statuses.get(&entry.key.url) {
            Some(Ok(state)) => {
                for occurrence in entry.occurrences.iter_mut() {
                    occurrence.tier = Some(classify(state, occurrence.has_stale_keyword));
                }
                entry.tier = entry.occurrences.iter().filter_map(|o| o.tier).min();
                entry.status = Some(state.clone());
                entry.error = None;
            }
            Some(Err(e)) => {
                entry.error = Some(e.clone());
            }
            None => {
                entry.error = Some(FetchError::Transport(
                    "status missing from batch result".to_string(),
                ));
            }
        }
    }
}

/// Stale first, then closed, then open, then unresolved. Stable, so ties
/// keep discovery order.
pub fn rank_entries(entries: &mut [WorkspaceEntry]) {
    entries.sort_by_key(|entry| (entry.tier.is_none(), entry.tier));
}
