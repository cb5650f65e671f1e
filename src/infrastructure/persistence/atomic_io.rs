//! Atomic file primitives.
//!
//! Non-append writes go through a temp file in the destination directory
//! followed by a rename, so the destination only ever holds a complete
//! value. Appends use `O_APPEND` semantics with one JSON object per line.

use std::io::Write;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::domain::errors::{CoreError, CoreResult};

/// Write `content` to `path` atomically via temp-file-then-rename.
pub async fn atomic_write(path: &Path, content: &str) -> CoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| {
            CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no parent directory for {}", path.display()),
            ))
        })?
        .to_path_buf();
    tokio::fs::create_dir_all(&parent).await?;

    let dest = path.to_path_buf();
    let content = content.to_owned();
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp_")
            .tempfile_in(&parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;

    result?;
    tracing::trace!(path = %path.display(), "atomic write completed");
    Ok(())
}

/// Append one line (terminated by `\n`) to `path`, creating it if needed.
pub async fn append_line(path: &Path, line: &str) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

/// Reject path components that could escape the store root.
pub fn validate_component(component: &str) -> CoreResult<()> {
    if component.is_empty()
        || component.contains('/')
        || component.contains('\\')
        || component.contains("..")
    {
        return Err(CoreError::InvalidIdentifier(component.to_string()));
    }
    Ok(())
}
