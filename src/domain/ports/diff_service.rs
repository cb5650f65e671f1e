//! Diff service port.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::{DiffResult, MultiRepoDiffResult, StashResult};

/// Port for diff and stash operations against a local version-control tool.
///
/// Per-repo operations are required; the multi-repo compositions have
/// default implementations that iterate repos in the order given and, for
/// stash/pop, continue past per-repo failures.
#[async_trait]
pub trait DiffService: Send + Sync {
    /// Diff of worktree changes against HEAD, scoped to the repo directory.
    async fn worktree_diff(&self, repo_path: &Path) -> CoreResult<DiffResult>;

    /// Diff of staged changes only, scoped to the repo directory.
    async fn staged_diff(&self, repo_path: &Path) -> CoreResult<DiffResult>;

    /// Stash all changes including untracked files (respects the ignore
    /// list). Returns an opaque stash handle.
    async fn stash_changes(&self, repo_path: &Path, message: &str) -> CoreResult<String>;

    /// Restore the most recent stash and drop its entry.
    async fn pop_stash(&self, repo_path: &Path) -> CoreResult<()>;

    async fn is_repo(&self, path: &Path) -> bool;

    /// Whether the repository has any commit.
    async fn has_head(&self, repo_path: &Path) -> bool;

    /// Worktree diffs across repos, with summed counters.
    async fn worktree_diff_all(&self, repo_paths: &[PathBuf]) -> CoreResult<MultiRepoDiffResult> {
        let mut results = BTreeMap::new();
        for path in repo_paths {
            results.insert(path.clone(), self.worktree_diff(path).await?);
        }
        Ok(MultiRepoDiffResult::merge(results))
    }

    /// Stash every repo; partial failure is allowed and reported per repo.
    async fn stash_all_repos(
        &self,
        repo_paths: &[PathBuf],
        message: &str,
    ) -> Vec<StashResult> {
        let mut results = Vec::with_capacity(repo_paths.len());
        for path in repo_paths {
            match self.stash_changes(path, message).await {
                Ok(stash_ref) => results.push(StashResult::ok(path.clone(), Some(stash_ref))),
                Err(e) => results.push(StashResult::failed(path.clone(), e.to_string())),
            }
        }
        results
    }

    /// Pop every repo's stash; partial failure is allowed.
    async fn pop_all_repos(&self, repo_paths: &[PathBuf]) -> Vec<StashResult> {
        let mut results = Vec::with_capacity(repo_paths.len());
        for path in repo_paths {
            match self.pop_stash(path).await {
                Ok(()) => results.push(StashResult::ok(path.clone(), None)),
                Err(e) => results.push(StashResult::failed(path.clone(), e.to_string())),
            }
        }
        results
    }
}
