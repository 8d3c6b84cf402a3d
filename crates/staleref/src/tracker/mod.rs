//
// tracker/mod.rs
//
// Contract for clients that resolve tracker items
//

pub mod gh;

pub use gh::GhClient;

use std::time::Duration;

use async_trait::async_trait;

use crate::reference::IssueKey;
use crate::status::IssueState;

/// Why a single item could not be resolved.
///
/// Categories are distinct for logging only; none of them is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,
    /// Missing credentials, insufficient scope, or rate limiting
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::NotFound => "not-found",
            FetchError::Unauthorized(_) => "unauthorized",
            FetchError::Timeout(_) => "timeout",
            FetchError::Transport(_) => "transport",
            FetchError::Parse(_) => "parse",
        }
    }
}

pub type FetchOutcome = Result<IssueState, FetchError>;

/// Anything that can look up the live state of one tracker item.
///
/// Implementations own transport, authentication and rate limiting. The engine
/// bounds concurrency and applies its own timeout around each call.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn fetch(&self, key: &IssueKey) -> FetchOutcome;
}
