//! Default state-directory resolution.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::debug;

/// Name of the state directory placed under the resolved root.
pub const STATE_DIR_NAME: &str = ".proofloop";

/// Root of the repository enclosing `path`, when there is one.
pub async fn enclosing_repo_root(path: &Path) -> Option<PathBuf> {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!root.is_empty()).then(|| PathBuf::from(root))
}

/// Default state dir for a workspace: `.proofloop` under the enclosing repo
/// root when the workspace sits inside one, else under the workspace itself.
pub async fn default_state_dir(workspace: &Path) -> PathBuf {
    let root = enclosing_repo_root(workspace)
        .await
        .unwrap_or_else(|| workspace.to_path_buf());
    let state_dir = root.join(STATE_DIR_NAME);
    debug!(workspace = %workspace.display(), state_dir = %state_dir.display(), "resolved state dir");
    state_dir
}
