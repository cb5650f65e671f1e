//! Workspace discovery snapshots.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Immutable snapshot of the repositories found under a workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub root: PathBuf,
    /// True when the root holds multiple repositories rather than being one.
    pub is_multi_repo: bool,
    /// Repository roots, lexicographic by absolute path.
    pub repos: Vec<PathBuf>,
}

impl WorkspaceInfo {
    pub fn single(root: PathBuf) -> Self {
        Self {
            is_multi_repo: false,
            repos: vec![root.clone()],
            root,
        }
    }

    pub fn is_single_repo(&self) -> bool {
        !self.is_multi_repo && self.repos.len() == 1
    }

    /// Short display name of a repo: relative to the workspace root when
    /// possible.
    pub fn repo_name(&self, repo: &Path) -> String {
        repo.strip_prefix(&self.root)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| repo.display().to_string(), |p| p.display().to_string())
    }
}

/// Status probe of a single repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatus {
    pub path: PathBuf,
    pub has_changes: bool,
    #[serde(default)]
    pub stash_ref: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RepoStatus {
    pub fn clean(path: PathBuf) -> Self {
        Self {
            path,
            has_changes: false,
            stash_ref: None,
            error: None,
        }
    }
}
