//! Diff and stash value types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result of generating a diff for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// `git diff` output. Empty string for a clean tree.
    pub diff: String,
    /// Patch form of the same changes.
    pub patch: String,
    pub files_changed: Vec<String>,
    pub insertions: u64,
    pub deletions: u64,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty() && self.files_changed.is_empty()
    }
}

/// Diffs aggregated across every repository in a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiRepoDiffResult {
    /// Repo path -> per-repo result, ordered by path.
    pub repo_diffs: BTreeMap<PathBuf, DiffResult>,
    pub total_files_changed: u64,
    pub total_insertions: u64,
    pub total_deletions: u64,
}

impl MultiRepoDiffResult {
    /// Merge per-repo results, summing counters.
    pub fn merge(results: BTreeMap<PathBuf, DiffResult>) -> Self {
        let total_files_changed = results.values().map(|r| r.files_changed.len() as u64).sum();
        let total_insertions = results.values().map(|r| r.insertions).sum();
        let total_deletions = results.values().map(|r| r.deletions).sum();
        Self {
            repo_diffs: results,
            total_files_changed,
            total_insertions,
            total_deletions,
        }
    }

    pub fn from_single(repo: PathBuf, result: DiffResult) -> Self {
        Self::merge(BTreeMap::from([(repo, result)]))
    }

    pub fn is_empty(&self) -> bool {
        self.repo_diffs.values().all(DiffResult::is_empty)
    }

    /// Concatenated diff with one `# repo:` section per repository.
    pub fn combined_diff(&self) -> String {
        self.combined(|r| &r.diff)
    }

    /// Concatenated patch with one `# repo:` section per repository.
    pub fn combined_patch(&self) -> String {
        self.combined(|r| &r.patch)
    }

    fn combined<'a>(&'a self, select: impl Fn(&'a DiffResult) -> &'a str) -> String {
        let mut out = String::new();
        for (path, result) in &self.repo_diffs {
            let body = select(result);
            if body.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("# repo: {}\n", path.display()));
            out.push_str(body);
            if !body.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// Outcome of stashing one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashResult {
    pub repo_path: PathBuf,
    pub success: bool,
    #[serde(default)]
    pub stash_ref: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StashResult {
    pub fn ok(repo_path: PathBuf, stash_ref: Option<String>) -> Self {
        Self {
            repo_path,
            success: true,
            stash_ref,
            error: None,
        }
    }

    pub fn failed(repo_path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            repo_path,
            success: false,
            stash_ref: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(files: &[&str], ins: u64, del: u64) -> DiffResult {
        DiffResult {
            diff: if files.is_empty() {
                String::new()
            } else {
                format!("--- a/{}\n+++ b/{}\n", files[0], files[0])
            },
            patch: String::new(),
            files_changed: files.iter().map(ToString::to_string).collect(),
            insertions: ins,
            deletions: del,
        }
    }

    #[test]
    fn merge_sums_counters_across_repos() {
        let merged = MultiRepoDiffResult::merge(BTreeMap::from([
            (PathBuf::from("/w/backend"), diff(&["a.py"], 4, 1)),
            (PathBuf::from("/w/frontend"), diff(&["b.ts", "c.ts"], 6, 2)),
        ]));
        assert_eq!(merged.total_files_changed, 3);
        assert_eq!(merged.total_insertions, 10);
        assert_eq!(merged.total_deletions, 3);
    }

    #[test]
    fn combined_diff_has_one_section_per_dirty_repo() {
        let merged = MultiRepoDiffResult::merge(BTreeMap::from([
            (PathBuf::from("/w/backend"), diff(&["a.py"], 1, 0)),
            (PathBuf::from("/w/clean"), DiffResult::default()),
            (PathBuf::from("/w/frontend"), diff(&["b.ts"], 1, 0)),
        ]));
        let combined = merged.combined_diff();
        assert!(combined.contains("# repo: /w/backend"));
        assert!(combined.contains("# repo: /w/frontend"));
        assert!(!combined.contains("/w/clean"));
    }

    #[test]
    fn clean_workspace_is_empty() {
        let merged = MultiRepoDiffResult::from_single(
            PathBuf::from("/w"),
            DiffResult::default(),
        );
        assert!(merged.is_empty());
        assert_eq!(merged.combined_diff(), "");
    }
}
