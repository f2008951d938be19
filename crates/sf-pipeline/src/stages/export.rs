//! Primary artifact export.

use async_trait::async_trait;

use sf_av::{resolve_artifact, ArtifactQuery};
use sf_core::Result;

use super::blocking;
use super::train::MODEL_FILE;
use crate::context::StageContext;
use crate::stage::{Stage, StageInput, StageOutput};

/// Copy the trained model out of its run directory to `models/<id>.ply`.
#[derive(Debug, Default)]
pub struct ExportPly;

#[async_trait]
impl Stage for ExportPly {
    fn name(&self) -> &'static str {
        "Export"
    }

    async fn run(&self, ctx: &StageContext, input: StageInput) -> Result<StageOutput> {
        let model_dir = input.primary(self.name())?;
        let source = if model_dir.is_file() {
            model_dir.clone()
        } else {
            resolve_artifact(model_dir, &ArtifactQuery::new(MODEL_FILE))?
        };
        let dest = ctx.workspace.artifact_path();

        let bytes = {
            let (from, to) = (source.clone(), dest.clone());
            blocking(move || Ok(std::fs::copy(&from, &to)?)).await?
        };

        tracing::info!(
            job_id = %ctx.job_id,
            source = %source.display(),
            dest = %dest.display(),
            bytes,
            "Exported model"
        );
        Ok(StageOutput {
            artifact: dest,
            summary: format!("Exported {:.1}KB model", bytes as f64 / 1024.0),
        })
    }
}
