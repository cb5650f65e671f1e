//! Shared subprocess plumbing for CLI-driven agents.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::domain::errors::{CoreError, CoreResult};

/// Spawn `cmd`, feed `prompt` on stdin, and hand each stdout line to
/// `on_line`. A non-zero exit surfaces the collected stderr as a provider
/// error so the retry policy can classify it.
pub(crate) async fn run_cli(
    mut cmd: Command,
    prompt: &str,
    mut on_line: impl FnMut(&str) + Send,
) -> CoreResult<()> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| CoreError::Provider(format!("failed to spawn agent CLI: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| CoreError::Provider(format!("failed to write prompt: {e}")))?;
        drop(stdin);
    }

    // Drain stderr concurrently so a chatty CLI cannot deadlock the pipe.
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut collected = String::new();
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
            }
        }
        collected
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| CoreError::Provider(format!("failed to read agent output: {e}")))?
        {
            if !line.trim().is_empty() {
                on_line(&line);
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| CoreError::Provider(format!("failed to wait for agent CLI: {e}")))?;
    let stderr_text = stderr_task.await.unwrap_or_default();

    if !status.success() {
        let detail = if stderr_text.trim().is_empty() {
            format!("agent CLI exited with {status}")
        } else {
            stderr_text.trim().to_string()
        };
        return Err(CoreError::Provider(detail));
    }

    debug!("agent CLI completed");
    Ok(())
}
