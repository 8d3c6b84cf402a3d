//
// providers/mod.rs
//
// Host-side collaborators the scan engine depends on
//

pub mod comments;
pub mod files;

pub use comments::MarkerCommentSpans;
pub use files::{GitFileLister, WalkFileLister};

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::reference::{CommentSpan, Reference};
use crate::status::{IssueState, Tier};

/// Finds comment regions in source text.
///
/// `language` is a host-defined identifier (for example `rust` or `python`);
/// `None` means unknown.
pub trait CommentSpanProvider: Send + Sync {
    fn spans(&self, text: &str, language: Option<&str>) -> Vec<CommentSpan>;
}

/// Lists the files a workspace scan should visit, in a stable order
#[async_trait]
pub trait FileLister: Send + Sync {
    async fn list_tracked_files(&self) -> anyhow::Result<Vec<PathBuf>>;
}

/// Host-assigned identity of an open buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferId(pub u64);

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buffer {}", self.0)
    }
}

/// Contents of a buffer at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSnapshot {
    pub text: String,
    pub language: Option<String>,
}

impl BufferSnapshot {
    pub fn new(text: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            text: text.into(),
            language: language.map(str::to_string),
        }
    }
}

/// Access to live buffer contents
pub trait BufferSource: Send + Sync {
    /// Current contents, or `None` if the buffer no longer exists
    fn snapshot(&self, buffer: BufferId) -> Option<BufferSnapshot>;

    /// Whether the buffer still exists and accepts annotations
    fn is_valid(&self, buffer: BufferId) -> bool;
}

/// One rendered reference in a buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub line: usize,
    pub start_column: usize,
    pub end_column: usize,
    pub url: String,
    pub tier: Tier,
    pub title: String,
    pub status: IssueState,
}

impl Annotation {
    pub fn new(reference: &Reference, status: IssueState, tier: Tier) -> Self {
        Self {
            line: reference.line,
            start_column: reference.start_column,
            end_column: reference.end_column,
            url: reference.key.display_url(),
            tier,
            title: status.title.clone(),
            status,
        }
    }
}

/// Receives per-buffer results.
///
/// Each `render` replaces every annotation previously rendered for the buffer.
pub trait AnnotationSink: Send + Sync {
    fn render(&self, buffer: BufferId, annotations: Vec<Annotation>);
    fn clear(&self, buffer: BufferId);
}
