//
// reference/extract.rs
//
// Tracker URL extraction from comment text
//

use std::collections::HashSet;

use regex::Regex;

use super::position::remap_position;
use super::{is_valid_identifier, CommentSpan, IssueKey, Reference, ReferenceKind};
use crate::config::StaleRefConfig;

/// Compiled URL patterns for one set of tracker hosts
#[derive(Debug, Clone)]
struct UrlPatterns {
    issue: Regex,
    pull: Option<Regex>,
}

/// Build the pattern for one URL shape.
///
/// Groups: 1=host, 2=owner, 3=repo, 4=path segment, 5=number. Owner and repo are
/// captured loosely (anything up to the next `/` or whitespace) so that names with
/// illegal characters are rejected by validation instead of being silently truncated.
fn url_pattern(hosts: &[String], segments: &str) -> Option<Regex> {
    if hosts.is_empty() {
        return None;
    }
    let hosts = hosts
        .iter()
        .map(|h| regex::escape(h))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(
        r"(?i:https?://({hosts}))/([^/\s]+)/([^/\s]+)/({segments})/(\d+)\b"
    );
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Failed to compile tracker URL pattern: {}", e);
            None
        }
    }
}

/// Extracts tracker references from comment spans.
///
/// Construction compiles the URL patterns once; [`ReferenceExtractor::extract`]
/// is then a pure function of its input and never fails. Malformed matches
/// (bad owner/repo names, a zero or overflowing number) are dropped.
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    patterns: Option<UrlPatterns>,
    /// Stale keywords, lowercased for case-insensitive matching
    keywords: Vec<String>,
}

impl ReferenceExtractor {
    pub fn new(hosts: &[String], include_pull_requests: bool, keywords: &[String]) -> Self {
        let patterns = url_pattern(hosts, "issues|issue").map(|issue| UrlPatterns {
            issue,
            pull: if include_pull_requests {
                url_pattern(hosts, "pulls|pull")
            } else {
                None
            },
        });
        let keywords = keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| k.to_lowercase())
            .collect();
        Self { patterns, keywords }
    }

    pub fn from_config(config: &StaleRefConfig) -> Self {
        Self::new(
            &config.tracker_hosts,
            config.include_pull_requests,
            &config.stale_keywords,
        )
    }

    /// Case-insensitive substring search for any configured stale keyword.
    pub fn has_stale_keyword(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// Extract all references from one comment, ordered by position.
    ///
    /// # Examples
    ///
    /// ```
    /// use staleref::reference::{CommentSpan, ReferenceExtractor};
    ///
    /// let extractor = ReferenceExtractor::new(&["github.com".into()], true, &["TODO".into()]);
    /// let span = CommentSpan::new("// TODO: drop after https://github.com/a/b/issues/3", 12, 4);
    /// let refs = extractor.extract(&span);
    /// assert_eq!(refs.len(), 1);
    /// assert_eq!(refs[0].line, 12);
    /// assert!(refs[0].has_stale_keyword);
    /// ```
    pub fn extract(&self, span: &CommentSpan) -> Vec<Reference> {
        let Some(patterns) = &self.patterns else {
            return Vec::new();
        };
        let text = span.text.as_str();

        let mut matches = Vec::new();
        collect_matches(&patterns.issue, text, &mut matches);
        if let Some(pull) = &patterns.pull {
            collect_matches(pull, text, &mut matches);
        }
        if matches.is_empty() {
            return Vec::new();
        }
        matches.sort_by_key(|m| m.start);

        let has_stale_keyword = self.has_stale_keyword(text);
        let comment_text = text.trim().to_string();

        let mut seen = HashSet::new();
        let mut references = Vec::with_capacity(matches.len());
        for m in matches {
            if !seen.insert(m.key.url.clone()) {
                log::trace!("  Skipping duplicate reference {} in comment", m.key.url);
                continue;
            }
            let pos = remap_position(span.start_line, span.start_column, text, m.start);
            references.push(Reference {
                key: m.key,
                line: pos.line,
                start_column: pos.column,
                end_column: pos.column + (m.end - m.start),
                comment_text: comment_text.clone(),
                has_stale_keyword,
            });
        }

        log::trace!(
            "Extracted {} references from comment at {}:{}",
            references.len(),
            span.start_line,
            span.start_column
        );
        references
    }

    /// Extract references from every span, keeping span order.
    pub fn extract_all<'a>(&self, spans: impl IntoIterator<Item = &'a CommentSpan>) -> Vec<Reference> {
        spans
            .into_iter()
            .flat_map(|span| self.extract(span))
            .collect()
    }
}

/// A validated match before position remapping
struct RawMatch {
    key: IssueKey,
    start: usize,
    end: usize,
}

fn collect_matches(re: &Regex, text: &str, out: &mut Vec<RawMatch>) {
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(host), Some(owner), Some(repo), Some(segment), Some(number)) = (
            caps.get(0),
            caps.get(1),
            caps.get(2),
            caps.get(3),
            caps.get(4),
            caps.get(5),
        ) else {
            continue;
        };

        let owner = owner.as_str();
        let repo = repo.as_str();
        if !is_valid_identifier(owner) || !is_valid_identifier(repo) {
            log::trace!("  Dropping match with invalid owner/repo: {}", whole.as_str());
            continue;
        }
        let Some(kind) = ReferenceKind::from_path_segment(&segment.as_str().to_ascii_lowercase())
        else {
            continue;
        };
        let number = match number.as_str().parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                log::trace!("  Dropping match with invalid number: {}", whole.as_str());
                continue;
            }
        };

        out.push(RawMatch {
            key: IssueKey::new(host.as_str(), owner, repo, kind, number),
            start: whole.start(),
            end: whole.end(),
        });
    }
}
