//! Seam to the embedded compute/server runtime.
//!
//! The computation itself — the code that consumes resolved parameters and
//! produces result datasets — is an external collaborator invoked inside the
//! container. The entry point hands it the resolved [`RunContext`] by
//! reference through this trait; nothing is smuggled through ambient process
//! state on our side.

use crate::constants::ENV_VAR_PREFIX;
use crate::error::{Error, Result};
use crate::resolve::RunContext;
use crate::runner::RunMode;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::info;

/// The computation the entry point drives.
#[async_trait]
pub trait ComputeRuntime: Send + Sync {
    /// Runs the computation with an explicit resolved-parameter context.
    async fn execute(&self, ctx: &RunContext, mode: &RunMode) -> Result<()>;
}

/// Runs the generated user code as a child process.
///
/// The context is handed over explicitly on the child's boundary: each
/// scalar as a prefixed environment variable, each staged dataset as a
/// prefixed variable carrying its resolved path. This mirrors the interface
/// the entry point itself consumes, so the computation can be exercised
/// stand-alone with the same contract.
pub struct ProcessRuntime {
    interpreter: String,
    script: PathBuf,
}

impl ProcessRuntime {
    pub fn new(script: PathBuf) -> Self {
        Self {
            interpreter: "python".to_string(),
            script,
        }
    }
}

#[async_trait]
impl ComputeRuntime for ProcessRuntime {
    async fn execute(&self, ctx: &RunContext, mode: &RunMode) -> Result<()> {
        let mut command = Command::new(&self.interpreter);
        command.arg(&self.script);
        if mode.server {
            command.arg("--server");
        }
        if mode.from_saved {
            command.arg("--from-saved");
        }
        for (name, value) in &ctx.values {
            command.env(format!("{ENV_VAR_PREFIX}{name}"), value.to_string());
        }
        for (name, dataset) in &ctx.datasets {
            command.env(format!("{ENV_VAR_PREFIX}{name}"), &dataset.path);
        }

        info!("starting computation {}", self.script.display());
        let status = command
            .status()
            .await
            .map_err(|e| Error::Compute(format!("failed to spawn computation: {e}")))?;
        if !status.success() {
            return Err(Error::Compute(format!(
                "computation exited with {status}"
            )));
        }
        Ok(())
    }
}
