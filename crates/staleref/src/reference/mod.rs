//
// reference/mod.rs
//
// Issue-tracker references found inside source comments
//

pub mod extract;
pub mod position;

#[cfg(test)]
mod property_tests;

pub use extract::*;
pub use position::*;

use serde::Serialize;

/// What a tracker URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Issue,
    PullRequest,
}

impl ReferenceKind {
    /// Path segment used by the canonical URL form
    pub fn path_segment(self) -> &'static str {
        match self {
            ReferenceKind::Issue => "issues",
            ReferenceKind::PullRequest => "pull",
        }
    }

    /// Map a URL path segment (`issues`, `issue`, `pull`, `pulls`) to a kind.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "issues" | "issue" => Some(ReferenceKind::Issue),
            "pull" | "pulls" => Some(ReferenceKind::PullRequest),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Issue => "issue",
            ReferenceKind::PullRequest => "pull-request",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format the URL for a tracker item.
///
/// An [`IssueKey`] stores this string built from its case-folded parts as its
/// `url`; [`IssueKey::display_url`] builds it from the parts as written.
///
/// # Examples
///
/// ```
/// use staleref::reference::{format_url, ReferenceKind};
///
/// let url = format_url("github.com", "acme", "widgets", ReferenceKind::Issue, 42);
/// assert_eq!(url, "https://github.com/acme/widgets/issues/42");
/// ```
pub fn format_url(
    host: &str,
    owner: &str,
    repo: &str,
    kind: ReferenceKind,
    number: u64,
) -> String {
    format!(
        "https://{}/{}/{}/{}/{}",
        host,
        owner,
        repo,
        kind.path_segment(),
        number
    )
}

/// Check that an owner or repository name is safe to use in a tracker request.
///
/// Names must:
/// - Be non-empty
/// - Contain only ASCII letters, digits, `.`, `_` and `-`
/// - Not start or end with a dot
/// - Not contain two consecutive dots
///
/// The dot rules reject path-traversal shaped values such as `..` before they
/// ever reach a request path.
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

/// Identity of one tracker item, shared by every reference pointing at it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IssueKey {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub kind: ReferenceKind,
    pub number: u64,
    /// Canonical URL, the cache and grouping key. Host, owner and repository
    /// are lowercased since trackers resolve them case-insensitively.
    pub url: String,
}

impl IssueKey {
    pub fn new(
        host: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        kind: ReferenceKind,
        number: u64,
    ) -> Self {
        let host = host.into().to_ascii_lowercase();
        let owner = owner.into();
        let repo = repo.into();
        let url = format_url(
            &host,
            &owner.to_ascii_lowercase(),
            &repo.to_ascii_lowercase(),
            kind,
            number,
        );
        Self {
            host,
            owner,
            repo,
            kind,
            number,
            url,
        }
    }

    /// The URL with owner and repository as they were written
    pub fn display_url(&self) -> String {
        format_url(&self.host, &self.owner, &self.repo, self.kind, self.number)
    }
}

/// A comment as reported by the comment-span provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSpan {
    /// Raw comment text, including markers and any embedded line breaks
    pub text: String,
    /// 1-indexed line of the first byte of `text`
    pub start_line: usize,
    /// 0-indexed byte column of the first byte of `text`
    pub start_column: usize,
}

impl CommentSpan {
    pub fn new(text: impl Into<String>, start_line: usize, start_column: usize) -> Self {
        Self {
            text: text.into(),
            start_line,
            start_column,
        }
    }
}

/// One tracker URL occurrence in source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub key: IssueKey,
    /// 1-indexed line of the URL
    pub line: usize,
    /// 0-indexed byte column where the URL starts
    pub start_column: usize,
    /// Exclusive end column
    pub end_column: usize,
    /// Full enclosing comment, trimmed
    pub comment_text: String,
    /// Whether the enclosing comment mentions a stale keyword
    pub has_stale_keyword: bool,
}

impl Reference {
    pub fn url(&self) -> &str {
        &self.key.url
    }
}
