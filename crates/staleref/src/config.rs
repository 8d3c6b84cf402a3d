//
// config.rs
//
// Engine configuration
//

use std::time::Duration;

use crate::status::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_STATUS_TTL};

/// Values the scan engine consumes. The engine never reads configuration
/// sources itself; hosts build this struct (or use [`parse_config`]) and hand
/// it to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRefConfig {
    /// Status cache time-to-live in seconds
    pub ttl_secs: u64,
    /// Per-buffer debounce delay in milliseconds
    pub debounce_ms: u64,
    /// Substrings marking a comment as a workaround (case-insensitive)
    pub stale_keywords: Vec<String>,
    /// Whether pull-request URLs are extracted
    pub include_pull_requests: bool,
    /// Files scanned concurrently per workspace batch
    pub batch_size: usize,
    /// Files larger than this are skipped
    pub max_file_size_bytes: u64,
    /// Minimum interval between progress callbacks in milliseconds
    pub progress_interval_ms: u64,
    /// Tracker hosts whose URLs are recognised
    pub tracker_hosts: Vec<String>,
    /// Upper bound on concurrent tracker fetches
    pub max_concurrent_fetches: usize,
    /// Per-fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,
}

impl Default for StaleRefConfig {
    /// Defaults tuned for an interactive editor session against github.com.
    ///
    /// # Examples
    ///
    /// ```
    /// use staleref::config::StaleRefConfig;
    ///
    /// let cfg = StaleRefConfig::default();
    /// assert_eq!(cfg.ttl_secs, 300);
    /// assert_eq!(cfg.batch_size, 20);
    /// assert!(cfg.include_pull_requests);
    /// ```
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_STATUS_TTL.as_secs(),
            debounce_ms: 500,
            stale_keywords: ["TODO", "FIXME", "HACK", "WORKAROUND", "XXX"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            include_pull_requests: true,
            batch_size: 20,
            max_file_size_bytes: 1024 * 1024,
            progress_interval_ms: 100,
            tracker_hosts: vec!["github.com".to_string()],
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StaleRefConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Batch size, never zero
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Check if settings baked into the status cache or fetcher changed
    pub fn fetch_settings_changed(&self, other: &Self) -> bool {
        self.ttl_secs != other.ttl_secs
            || self.max_concurrent_fetches != other.max_concurrent_fetches
            || self.fetch_timeout_ms != other.fetch_timeout_ms
    }
}

fn string_list(value: &serde_json::Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

/// Parse engine configuration from a JSON settings object.
///
/// Reads the top-level `staleref` section. Only keys present in the JSON are
/// applied; absent keys keep their defaults. Returns `None` when the section
/// is missing.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use staleref::config::parse_config;
///
/// let settings = json!({
///     "staleref": {
///         "ttlSecs": 60,
///         "staleKeywords": ["TODO", "remove when"],
///         "includePullRequests": false
///     }
/// });
/// let cfg = parse_config(&settings).unwrap();
/// assert_eq!(cfg.ttl_secs, 60);
/// assert!(!cfg.include_pull_requests);
/// ```
pub fn parse_config(settings: &serde_json::Value) -> Option<StaleRefConfig> {
    let section = settings.get("staleref")?;
    let mut config = StaleRefConfig::default();

    if let Some(v) = section.get("ttlSecs").and_then(|v| v.as_u64()) {
        config.ttl_secs = v;
    }
    if let Some(v) = section.get("debounceMs").and_then(|v| v.as_u64()) {
        config.debounce_ms = v;
    }
    if let Some(v) = section.get("staleKeywords").and_then(string_list) {
        config.stale_keywords = v;
    }
    if let Some(v) = section.get("includePullRequests").and_then(|v| v.as_bool()) {
        config.include_pull_requests = v;
    }
    if let Some(v) = section.get("batchSize").and_then(|v| v.as_u64()) {
        config.batch_size = (v as usize).max(1);
    }
    if let Some(v) = section.get("maxFileSizeBytes").and_then(|v| v.as_u64()) {
        config.max_file_size_bytes = v;
    }
    if let Some(v) = section.get("progressIntervalMs").and_then(|v| v.as_u64()) {
        config.progress_interval_ms = v;
    }
    if let Some(v) = section.get("trackerHosts").and_then(string_list) {
        config.tracker_hosts = v;
    }
    if let Some(v) = section.get("maxConcurrentFetches").and_then(|v| v.as_u64()) {
        config.max_concurrent_fetches = (v as usize).max(1);
    }
    if let Some(v) = section.get("fetchTimeoutMs").and_then(|v| v.as_u64()) {
        config.fetch_timeout_ms = v;
    }

    log::info!("staleref configuration loaded from settings:");
    log::info!("  ttl_secs: {}", config.ttl_secs);
    log::info!("  debounce_ms: {}", config.debounce_ms);
    log::info!("  stale_keywords: {:?}", config.stale_keywords);
    log::info!("  include_pull_requests: {}", config.include_pull_requests);
    log::info!("  batch_size: {}", config.batch_size);
    log::info!("  max_file_size_bytes: {}", config.max_file_size_bytes);
    log::info!("  progress_interval_ms: {}", config.progress_interval_ms);
    log::info!("  tracker_hosts: {:?}", config.tracker_hosts);
    log::info!("  max_concurrent_fetches: {}", config.max_concurrent_fetches);
    log::info!("  fetch_timeout_ms: {}", config.fetch_timeout_ms);

    Some(config)
}
