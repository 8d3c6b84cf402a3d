// providers/files.rs - Workspace file listing
//
// `git ls-files` when the root is a work tree, otherwise a filtered directory
// walk. Both return absolute paths in a stable order.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use walkdir::{DirEntry, WalkDir};

use super::FileLister;

/// Directory names never descended into by the walk
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "__pycache__"];

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&&*name)
}

/// Recursive walk of a directory, sorted by path
#[derive(Debug, Clone)]
pub struct WalkFileLister {
    root: PathBuf,
}

impl WalkFileLister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(anyhow!("not a directory: {}", root.display()));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::trace!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(DirEntry::into_path)
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl FileLister for WalkFileLister {
    async fn list_tracked_files(&self) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::walk(&root))
            .await
            .context("directory walk task failed")?
    }
}

/// Files tracked by git, with a directory-walk fallback
#[derive(Debug, Clone)]
pub struct GitFileLister {
    root: PathBuf,
    fallback: WalkFileLister,
}

impl GitFileLister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            fallback: WalkFileLister::new(root.clone()),
            root,
        }
    }

    async fn git_ls_files(&self) -> Result<Vec<PathBuf>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["ls-files", "-z"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow!("failed to run git: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git ls-files failed: {}", stderr.trim()));
        }
        Ok(parse_ls_files(&self.root, &output.stdout))
    }
}

/// Split NUL-separated `git ls-files -z` output into absolute paths
fn parse_ls_files(root: &Path, stdout: &[u8]) -> Vec<PathBuf> {
    stdout
        .split(|b| *b == 0)
        .filter(|rel| !rel.is_empty())
        .map(|rel| root.join(&*String::from_utf8_lossy(rel)))
        .collect()
}

#[async_trait]
impl FileLister for GitFileLister {
    async fn list_tracked_files(&self) -> Result<Vec<PathBuf>> {
        match self.git_ls_files().await {
            Ok(files) => {
                log::debug!("git ls-files listed {} files under {}", files.len(), self.root.display());
                Ok(files)
            }
            Err(e) => {
                log::debug!("{}; falling back to directory walk", e);
                self.fallback.list_tracked_files().await
            }
        }
    }
}
