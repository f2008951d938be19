//! Making sure external tools exist before a stage needs them.
//!
//! [`Provisioner`] is deliberately narrow: given a tool name it returns a
//! usable path or fails. [`LocalProvisioner`] only looks at what is already
//! on disk; it never downloads or clones anything.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use sf_core::{Error, Result};

use crate::tools::ToolRegistry;

/// Logical name of the splat trainer checkout.
pub const TRAINER: &str = "trainer";

/// Environment variable consulted for the trainer checkout.
pub const TRAINER_REPO_ENV: &str = "SPLATFORGE_TRAINER_REPO";

/// Entry script that marks a directory as a trainer checkout.
const TRAINER_SCRIPT: &str = "train.py";

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Return the path for `tool`: an executable for CLI tools, the checkout
    /// directory for [`TRAINER`].
    async fn ensure(&self, tool: &str) -> Result<PathBuf>;
}

/// Resolves tools from the [`ToolRegistry`] and the trainer from local paths.
#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    tools: Arc<ToolRegistry>,
    trainer_repo: Option<PathBuf>,
}

impl LocalProvisioner {
    pub fn new(tools: Arc<ToolRegistry>, trainer_repo: Option<PathBuf>) -> Self {
        Self {
            tools,
            trainer_repo,
        }
    }

    /// Candidate trainer locations, most specific first.
    fn trainer_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(ref repo) = self.trainer_repo {
            candidates.push(repo.clone());
        }
        if let Some(env) = std::env::var_os(TRAINER_REPO_ENV) {
            candidates.push(PathBuf::from(env));
        }
        candidates.push(PathBuf::from("../LongSplat"));
        candidates.push(PathBuf::from("./LongSplat"));
        candidates
    }

    fn find_trainer(&self) -> Result<PathBuf> {
        let candidates = self.trainer_candidates();
        candidates
            .iter()
            .find(|dir| is_trainer_checkout(dir))
            .cloned()
            .ok_or_else(|| {
                let tried: Vec<String> = candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                Error::tool(
                    TRAINER,
                    format!(
                        "no checkout with {TRAINER_SCRIPT} found (tried {}); set tools.trainer_repo or {TRAINER_REPO_ENV}",
                        tried.join(", ")
                    ),
                )
            })
    }
}

fn is_trainer_checkout(dir: &Path) -> bool {
    dir.join(TRAINER_SCRIPT).is_file()
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    async fn ensure(&self, tool: &str) -> Result<PathBuf> {
        if tool == TRAINER {
            let repo = self.find_trainer()?;
            tracing::debug!(path = %repo.display(), "Using trainer checkout");
            return Ok(repo);
        }
        Ok(self.tools.require(tool)?.path.clone())
    }
}
