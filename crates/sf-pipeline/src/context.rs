//! Execution context shared by all stages of one job.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sf_av::{JobWorkspace, Provisioner, ToolCommand, ToolRegistry};
use sf_core::config::Config;
use sf_core::JobId;

/// Context passed to every stage of a job.
#[derive(Clone)]
pub struct StageContext {
    /// Job being processed.
    pub job_id: JobId,
    /// Per-job paths under the storage root.
    pub workspace: Arc<JobWorkspace>,
    /// Tool registry for looking up external tool paths.
    pub tools: Arc<ToolRegistry>,
    /// Resolves the trainer checkout and interpreters on demand.
    pub provisioner: Arc<dyn Provisioner>,
    /// Application configuration.
    pub config: Arc<Config>,
    /// Cancelled on shutdown; supervised processes are killed when it fires.
    pub cancellation: CancellationToken,
}

impl StageContext {
    /// Create a context with a fresh cancellation token.
    pub fn new(
        workspace: Arc<JobWorkspace>,
        tools: Arc<ToolRegistry>,
        provisioner: Arc<dyn Provisioner>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            job_id: workspace.id(),
            workspace,
            tools,
            provisioner,
            config,
            cancellation: CancellationToken::new(),
        }
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The per-stage ceiling from configuration.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.config.processing.stage_timeout_secs)
    }

    /// A supervised command for `program`, wired to this job's cancellation
    /// token and the configured stage timeout.
    pub fn command(&self, program: impl Into<std::path::PathBuf>) -> ToolCommand {
        let mut cmd = ToolCommand::new(program.into());
        cmd.timeout(self.stage_timeout())
            .cancel_on(self.cancellation.clone());
        cmd
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("job_id", &self.job_id)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}
