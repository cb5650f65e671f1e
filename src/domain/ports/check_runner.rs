//! Check runner port.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::{CheckOutput, CheckSpec};

/// Runs a condition's verification command and captures the evidence.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    /// Run `spec.command` in `cwd`. Command failure is reported through the
    /// returned status, not through `Err`; `Err` means the runner itself
    /// could not operate.
    async fn run(&self, spec: &CheckSpec, cwd: &Path) -> CoreResult<CheckOutput>;
}
