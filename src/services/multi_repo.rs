//! Workspace repository discovery.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::errors::CoreResult;
use crate::domain::models::WorkspaceInfo;

/// Discovers git repositories under a workspace root.
///
/// The walk descends at most `max_depth` levels, stops at repository roots,
/// and skips hidden directories and symlinks. Results are lexicographic by
/// absolute path.
#[derive(Debug, Clone)]
pub struct MultiRepoManager {
    max_depth: usize,
}

impl Default for MultiRepoManager {
    fn default() -> Self {
        Self { max_depth: 3 }
    }
}

impl MultiRepoManager {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Discover repositories under `workspace_path`.
    ///
    /// A workspace that is itself a repository is a single-repo workspace;
    /// otherwise every repository found in the tree is returned. A workspace
    /// with no repositories at all is treated as single-repo rooted at the
    /// workspace (diffs will come back empty).
    pub async fn discover(&self, workspace_path: &Path) -> CoreResult<WorkspaceInfo> {
        let root = tokio::fs::canonicalize(workspace_path)
            .await
            .unwrap_or_else(|_| workspace_path.to_path_buf());

        if is_repo_root(&root).await {
            debug!(root = %root.display(), "workspace is a single repository");
            return Ok(WorkspaceInfo::single(root));
        }

        let mut repos = Vec::new();
        self.scan(&root, 0, &mut repos).await?;
        repos.sort();

        if repos.is_empty() {
            debug!(root = %root.display(), "no repositories found in workspace");
            return Ok(WorkspaceInfo::single(root));
        }

        debug!(root = %root.display(), repos = repos.len(), "discovered multi-repo workspace");
        Ok(WorkspaceInfo {
            is_multi_repo: repos.len() > 1 || repos.first() != Some(&root),
            repos,
            root,
        })
    }

    async fn scan(&self, path: &Path, depth: usize, repos: &mut Vec<PathBuf>) -> CoreResult<()> {
        if depth > self.max_depth {
            return Ok(());
        }
        if is_repo_root(path).await {
            repos.push(path.to_path_buf());
            return Ok(());
        }

        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable directory");
                return Ok(());
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(_) => continue,
            };
            if file_type.is_symlink() || !file_type.is_dir() {
                continue;
            }
            Box::pin(self.scan(&entry.path(), depth + 1, repos)).await?;
        }
        Ok(())
    }
}

async fn is_repo_root(path: &Path) -> bool {
    let git_dir = path.join(".git");
    tokio::fs::metadata(&git_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mkrepo(path: &Path) {
        tokio::fs::create_dir_all(path.join(".git")).await.unwrap();
    }

    #[tokio::test]
    async fn workspace_that_is_a_repo_is_single() {
        let dir = tempfile::tempdir().unwrap();
        mkrepo(dir.path()).await;
        let info = MultiRepoManager::default().discover(dir.path()).await.unwrap();
        assert!(info.is_single_repo());
    }

    #[tokio::test]
    async fn finds_nested_repos_in_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        mkrepo(&dir.path().join("frontend")).await;
        mkrepo(&dir.path().join("backend")).await;
        let info = MultiRepoManager::default().discover(dir.path()).await.unwrap();
        assert!(info.is_multi_repo);
        let names: Vec<String> = info
            .repos
            .iter()
            .map(|r| r.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["backend", "frontend"]);
    }

    #[tokio::test]
    async fn skips_hidden_directories() {
        let dir = tempfile::tempdir().unwrap();
        mkrepo(&dir.path().join(".cache/repo")).await;
        mkrepo(&dir.path().join("app")).await;
        let info = MultiRepoManager::default().discover(dir.path()).await.unwrap();
        assert_eq!(info.repos.len(), 1);
        assert!(info.repos[0].ends_with("app"));
    }

    #[tokio::test]
    async fn stops_descending_at_repo_roots() {
        let dir = tempfile::tempdir().unwrap();
        mkrepo(&dir.path().join("outer")).await;
        mkrepo(&dir.path().join("outer/vendored")).await;
        let info = MultiRepoManager::default().discover(dir.path()).await.unwrap();
        assert_eq!(info.repos.len(), 1);
        assert!(info.repos[0].ends_with("outer"));
    }

    #[tokio::test]
    async fn respects_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        mkrepo(&dir.path().join("a/b/c/d/repo")).await;
        let info = MultiRepoManager::default().discover(dir.path()).await.unwrap();
        // Depth 4 is beyond the default of 3; treated as repo-less workspace.
        assert!(info.is_single_repo());
        assert_eq!(info.repos, vec![info.root.clone()]);
    }

    #[tokio::test]
    async fn empty_workspace_is_single_rooted_at_itself() {
        let dir = tempfile::tempdir().unwrap();
        let info = MultiRepoManager::default().discover(dir.path()).await.unwrap();
        assert!(info.is_single_repo());
    }
}
