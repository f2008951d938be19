//! The [`Stage`] trait defines a single pipeline step.
//!
//! A stage consumes the files produced by the step before it and writes its
//! own output below `output_dir`. It never touches the job record; the
//! orchestrator owns status and progress.

use std::path::PathBuf;

use async_trait::async_trait;

use sf_core::{PresetConfig, Result, Severity};

use crate::context::StageContext;

/// What a stage is asked to work on.
#[derive(Debug, Clone)]
pub struct StageInput {
    /// Files or directories produced by the previous step.
    pub inputs: Vec<PathBuf>,
    /// Directory the stage writes into.
    pub output_dir: PathBuf,
    /// Quality parameters of the job's preset.
    pub params: PresetConfig,
}

impl StageInput {
    /// The first input, or an error naming the stage.
    pub fn primary(&self, stage: &str) -> Result<&PathBuf> {
        self.inputs
            .first()
            .ok_or_else(|| sf_core::Error::Internal(format!("{stage}: no input given")))
    }
}

/// Result of a successfully executed stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// The file or directory the next step consumes.
    pub artifact: PathBuf,
    /// Human-readable summary of what the stage did.
    pub summary: String,
}

/// A single step in the reconstruction pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// A short, human-readable name (e.g. "Frame extraction"). Used as the
    /// prefix of the job's error message.
    fn name(&self) -> &'static str;

    /// Whether a failure of this stage fails the job. Defaults to
    /// [`Severity::Hard`].
    fn severity(&self) -> Severity {
        Severity::Hard
    }

    /// Perform the stage.
    async fn run(&self, ctx: &StageContext, input: StageInput) -> Result<StageOutput>;
}
