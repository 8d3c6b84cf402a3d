// lib.rs - Tracker reference detection and status resolution
//
// Finds issue-tracker URLs in source comments, resolves their live status
// through a tracker client, and ranks the ones whose issues are resolved.
// The `staleref` binary in main.rs drives a one-shot workspace scan; editor
// hosts drive `scan::ScanSession` directly.

pub mod config;
pub mod generation;
pub mod perf;
pub mod providers;
pub mod reference;
pub mod scan;
pub mod status;
pub mod tracker;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
