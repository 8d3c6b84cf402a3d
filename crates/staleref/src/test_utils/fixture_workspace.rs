//! Deterministic fixture workspace generator for benchmarks and tests.
//!
//! Generates source files in several languages whose comments reference a
//! bounded pool of tracker issues, plus optional binary and oversized files
//! that a workspace scan must skip. Output contains no randomness.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Extensions and line-comment markers cycled through by generated files
const LANGUAGES: &[(&str, &str)] = &[("rs", "//"), ("py", "#"), ("sql", "--"), ("js", "//")];

/// Configuration for generating a fixture workspace.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub file_count: usize,
    pub references_per_file: usize,
    /// Size of the issue pool; references wrap around it
    pub distinct_issues: usize,
    pub extra_lines_per_file: usize,
    /// Files containing a null byte
    pub binary_files: usize,
    /// Files padded to this many bytes (0 disables them)
    pub oversized_bytes: usize,
    pub oversized_files: usize,
}

impl FixtureConfig {
    /// 10 files, 2 references each, no skipped files.
    pub fn small() -> Self {
        Self {
            file_count: 10,
            references_per_file: 2,
            distinct_issues: 5,
            extra_lines_per_file: 10,
            binary_files: 0,
            oversized_bytes: 0,
            oversized_files: 0,
        }
    }

    /// 50 files, 4 references each, with a few files to skip.
    pub fn medium() -> Self {
        Self {
            file_count: 50,
            references_per_file: 4,
            distinct_issues: 40,
            extra_lines_per_file: 50,
            binary_files: 2,
            oversized_bytes: 2 * 1024 * 1024,
            oversized_files: 1,
        }
    }

    /// 200 files, 8 references each.
    pub fn large() -> Self {
        Self {
            file_count: 200,
            references_per_file: 8,
            distinct_issues: 300,
            extra_lines_per_file: 200,
            binary_files: 5,
            oversized_bytes: 2 * 1024 * 1024,
            oversized_files: 2,
        }
    }

    /// References a full scan should find
    pub fn expected_references(&self) -> usize {
        self.file_count * self.references_per_file
    }

    /// Distinct issues those references point at
    pub fn expected_distinct_issues(&self) -> usize {
        self.expected_references().min(self.distinct_issues)
    }
}

/// Canonical URL of the n-th (1-based) fixture issue
pub fn issue_url(n: usize) -> String {
    format!("https://github.com/fixture/project/issues/{}", n)
}

/// Generate the content of one source file.
///
/// Even-numbered references carry a stale keyword.
fn generate_source_content(index: usize, config: &FixtureConfig) -> String {
    let (_, marker) = LANGUAGES[index % LANGUAGES.len()];
    let mut content = String::new();

    for r in 0..config.references_per_file {
        let slot = index * config.references_per_file + r;
        let issue = slot % config.distinct_issues.max(1) + 1;
        let lead = if slot % 2 == 0 { "TODO: remove workaround once" } else { "see" };
        writeln!(content, "{} {} {} is fixed", marker, lead, issue_url(issue)).unwrap();
        for line in 0..config.extra_lines_per_file / config.references_per_file.max(1) {
            writeln!(content, "value_{}_{}_{} = {}", index, r, line, line).unwrap();
        }
    }
    if config.references_per_file == 0 {
        for line in 0..config.extra_lines_per_file {
            writeln!(content, "value_{}_{} = {}", index, line, line).unwrap();
        }
    }
    content
}

/// Create a temporary directory populated with fixture files.
///
/// Returns the `TempDir` handle; the directory is removed when it is dropped.
pub fn create_fixture_workspace(config: &FixtureConfig) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory for fixture workspace");
    write_fixture_workspace(temp_dir.path(), config);
    temp_dir
}

/// Write fixture files into an existing directory.
///
/// Returns every written path in name order, which is generation order.
pub fn write_fixture_workspace(dir: &Path, config: &FixtureConfig) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut write = |name: String, content: &[u8]| {
        let path = dir.join(&name);
        std::fs::write(&path, content)
            .unwrap_or_else(|e| panic!("Failed to write fixture file {}: {}", name, e));
        paths.push(path);
    };

    for i in 0..config.file_count {
        let (ext, _) = LANGUAGES[i % LANGUAGES.len()];
        let content = generate_source_content(i, config);
        write(format!("file_{:04}.{}", i, ext), content.as_bytes());
    }

    for i in 0..config.binary_files {
        let mut content = format!("// {}\n", issue_url(i + 1)).into_bytes();
        content.extend_from_slice(&[0, 1, 2, 3]);
        write(format!("zz_binary_{:02}.bin", i), &content);
    }

    if config.oversized_bytes > 0 {
        for i in 0..config.oversized_files {
            let mut content = format!("// {}\n", issue_url(i + 1));
            while content.len() < config.oversized_bytes {
                content.push_str("// padding padding padding padding padding padding\n");
            }
            write(format!("zz_oversized_{:02}.rs", i), content.as_bytes());
        }
    }

    paths.sort();
    paths
}
