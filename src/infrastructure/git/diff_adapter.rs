//! Git implementation of the diff service.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::DiffResult;
use crate::domain::ports::DiffService;

/// Shells out to `git`; all diffs are scoped to the repo directory with
/// `-- .` so nested checkouts do not bleed into each other.
#[derive(Debug, Clone, Default)]
pub struct GitDiffAdapter;

impl GitDiffAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn run_git(&self, repo_path: &Path, args: &[&str]) -> CoreResult<String> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(repo_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(repo = %repo_path.display(), args = ?args, error = %stderr, "git command failed");
            return Err(CoreError::Git(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn probe(&self, repo_path: &Path, args: &[&str]) -> bool {
        tokio::process::Command::new("git")
            .args(args)
            .current_dir(repo_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn parse_files(output: &str) -> Vec<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    fn parse_stat_count(stats: &str, token: &str) -> u64 {
        // Summary line: " 3 files changed, 42 insertions(+), 10 deletions(-)"
        stats
            .split(',')
            .find_map(|part| {
                let part = part.trim();
                part.contains(token)
                    .then(|| part.split_whitespace().next())
                    .flatten()
                    .and_then(|n| n.parse().ok())
            })
            .unwrap_or(0)
    }

    async fn untracked_files(&self, repo_path: &Path) -> CoreResult<Vec<String>> {
        let output = self
            .run_git(repo_path, &["ls-files", "--others", "--exclude-standard"])
            .await?;
        Ok(Self::parse_files(&output))
    }
}

#[async_trait]
impl DiffService for GitDiffAdapter {
    async fn worktree_diff(&self, repo_path: &Path) -> CoreResult<DiffResult> {
        if !self.is_repo(repo_path).await {
            debug!(path = %repo_path.display(), "not a git repository");
            return Ok(DiffResult::default());
        }

        if !self.has_head(repo_path).await {
            // Empty repo: render untracked files as the diff.
            let files = self.untracked_files(repo_path).await?;
            return Ok(DiffResult {
                diff: format!("# New repository - {} untracked files", files.len()),
                patch: String::new(),
                files_changed: files,
                insertions: 0,
                deletions: 0,
            });
        }

        let diff = self.run_git(repo_path, &["diff", "HEAD", "--", "."]).await?;
        let patch = self
            .run_git(repo_path, &["diff", "HEAD", "--patch", "--", "."])
            .await?;
        let stats = self
            .run_git(repo_path, &["diff", "HEAD", "--stat", "--", "."])
            .await?;
        let files = self
            .run_git(repo_path, &["diff", "HEAD", "--name-only", "--", "."])
            .await?;

        Ok(DiffResult {
            diff,
            patch,
            files_changed: Self::parse_files(&files),
            insertions: Self::parse_stat_count(&stats, "insertion"),
            deletions: Self::parse_stat_count(&stats, "deletion"),
        })
    }

    async fn staged_diff(&self, repo_path: &Path) -> CoreResult<DiffResult> {
        if !self.is_repo(repo_path).await {
            debug!(path = %repo_path.display(), "not a git repository");
            return Ok(DiffResult::default());
        }

        let diff = self.run_git(repo_path, &["diff", "--cached", "--", "."]).await?;
        let patch = self
            .run_git(repo_path, &["diff", "--cached", "--patch", "--", "."])
            .await?;
        let stats = self
            .run_git(repo_path, &["diff", "--cached", "--stat", "--", "."])
            .await?;
        let files = self
            .run_git(repo_path, &["diff", "--cached", "--name-only", "--", "."])
            .await?;

        Ok(DiffResult {
            diff,
            patch,
            files_changed: Self::parse_files(&files),
            insertions: Self::parse_stat_count(&stats, "insertion"),
            deletions: Self::parse_stat_count(&stats, "deletion"),
        })
    }

    async fn stash_changes(&self, repo_path: &Path, message: &str) -> CoreResult<String> {
        let output = self
            .run_git(repo_path, &["stash", "push", "-u", "-m", message])
            .await?;
        debug!(repo = %repo_path.display(), "stashed changes");
        Ok(output.trim().to_string())
    }

    async fn pop_stash(&self, repo_path: &Path) -> CoreResult<()> {
        self.run_git(repo_path, &["stash", "pop"]).await?;
        debug!(repo = %repo_path.display(), "popped stash");
        Ok(())
    }

    async fn is_repo(&self, path: &Path) -> bool {
        self.probe(path, &["rev-parse", "--git-dir"]).await
    }

    async fn has_head(&self, repo_path: &Path) -> bool {
        self.probe(repo_path, &["rev-parse", "HEAD"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_summary_parsing() {
        let stats = " 3 files changed, 42 insertions(+), 10 deletions(-)\n";
        assert_eq!(GitDiffAdapter::parse_stat_count(stats, "insertion"), 42);
        assert_eq!(GitDiffAdapter::parse_stat_count(stats, "deletion"), 10);
    }

    #[test]
    fn stat_parsing_handles_singular_and_missing() {
        let stats = " 1 file changed, 1 insertion(+)\n";
        assert_eq!(GitDiffAdapter::parse_stat_count(stats, "insertion"), 1);
        assert_eq!(GitDiffAdapter::parse_stat_count(stats, "deletion"), 0);
        assert_eq!(GitDiffAdapter::parse_stat_count("", "insertion"), 0);
    }

    #[test]
    fn file_list_parsing_skips_blanks() {
        let files = "a.py\n\nsrc/b.py\n";
        assert_eq!(
            GitDiffAdapter::parse_files(files),
            vec!["a.py".to_string(), "src/b.py".to_string()]
        );
    }
}
