// tracker/gh.rs - Tracker client backed by the GitHub CLI
//
// Resolves issues and pull requests by running `gh api`, which carries its
// own authentication (`gh auth login`) and GitHub Enterprise host support.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{FetchError, FetchOutcome, TrackerClient};
use crate::reference::{IssueKey, ReferenceKind};
use crate::status::{IssueState, StateKind};

/// Host that `gh` talks to without `--hostname`
const DEFAULT_HOST: &str = "github.com";

/// `gh api` tracker client
#[derive(Debug, Clone)]
pub struct GhClient {
    gh_path: PathBuf,
}

impl Default for GhClient {
    fn default() -> Self {
        Self {
            gh_path: PathBuf::from("gh"),
        }
    }
}

impl GhClient {
    /// Use an explicit `gh` executable, or search PATH when `None`.
    ///
    /// Returns `None` when no usable executable is found.
    pub fn new(gh_path: Option<PathBuf>) -> Option<Self> {
        let path = match gh_path {
            Some(p) if p.is_file() => Some(p),
            Some(p) => {
                log::trace!("Provided gh path is not a file: {:?}", p);
                None
            }
            None => Self::find_gh_in_path(),
        };
        path.map(|gh_path| {
            log::trace!("Using gh executable at: {:?}", gh_path);
            Self { gh_path }
        })
    }

    pub fn gh_path(&self) -> &Path {
        &self.gh_path
    }

    fn find_gh_in_path() -> Option<PathBuf> {
        #[cfg(unix)]
        let finder = "which";
        #[cfg(windows)]
        let finder = "where";

        let output = std::process::Command::new(finder).arg("gh").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        // `where` may print several candidates; take the first
        let first = stdout.lines().next()?.trim();
        if first.is_empty() {
            return None;
        }
        Some(PathBuf::from(first))
    }

    /// REST path for a key, e.g. `repos/acme/widgets/issues/42`
    fn api_path(key: &IssueKey) -> String {
        let collection = match key.kind {
            ReferenceKind::Issue => "issues",
            ReferenceKind::PullRequest => "pulls",
        };
        format!("repos/{}/{}/{}/{}", key.owner, key.repo, collection, key.number)
    }
}

#[async_trait]
impl TrackerClient for GhClient {
    async fn fetch(&self, key: &IssueKey) -> FetchOutcome {
        let mut cmd = Command::new(&self.gh_path);
        cmd.arg("api");
        if !key.host.eq_ignore_ascii_case(DEFAULT_HOST) {
            cmd.args(["--hostname", key.host.as_str()]);
        }
        cmd.arg(Self::api_path(key));

        // The engine's timeout drops this future; the child must die with it
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| FetchError::Transport(format!("failed to spawn gh: {e}")))?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| FetchError::Transport(format!("failed to run gh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = classify_gh_failure(&stderr);
            log::debug!("gh api failed for {} ({}): {}", key.url, err.category(), stderr.trim());
            return Err(err);
        }

        parse_payload(&output.stdout, key.kind)
    }
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

/// Subset of the REST issue/pull payload we read
#[derive(Debug, Deserialize)]
struct Payload {
    state: String,
    #[serde(default)]
    state_reason: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    closed_at: Option<String>,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    merged: Option<bool>,
}

/// Turn a `gh api` JSON body into an [`IssueState`].
fn parse_payload(body: &[u8], kind: ReferenceKind) -> FetchOutcome {
    let payload: Payload =
        serde_json::from_slice(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let merged = payload.merged.unwrap_or(false) || payload.merged_at.is_some();
    let state = match payload.state.as_str() {
        "open" => StateKind::Open,
        "closed" if kind == ReferenceKind::PullRequest && merged => StateKind::Merged,
        "closed" => StateKind::Closed,
        other => {
            log::trace!("Unrecognised tracker state '{}'", other);
            StateKind::Unknown
        }
    };

    Ok(IssueState {
        state,
        state_reason: payload.state_reason,
        title: payload.title,
        labels: payload.labels.into_iter().map(|l| l.name).collect(),
        closed_at: payload.closed_at,
        merged_at: payload.merged_at,
    }
    .normalized_for(kind))
}

/// Map `gh api` stderr onto an error category.
fn classify_gh_failure(stderr: &str) -> FetchError {
    let lowered = stderr.to_lowercase();
    let message = stderr.trim().to_string();
    if lowered.contains("http 404") || lowered.contains("not found") {
        FetchError::NotFound
    } else if lowered.contains("http 401")
        || lowered.contains("http 403")
        || lowered.contains("rate limit")
        || lowered.contains("gh auth login")
        || lowered.contains("bad credentials")
    {
        FetchError::Unauthorized(message)
    } else {
        FetchError::Transport(message)
    }
}
