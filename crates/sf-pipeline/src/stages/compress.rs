//! Gzip of the primary artifact.

use async_trait::async_trait;

use sf_core::{Result, Severity};

use super::blocking;
use crate::context::StageContext;
use crate::stage::{Stage, StageInput, StageOutput};

/// Write `models/<id>.ply.gz` beside the artifact. The uncompressed model
/// stays the primary output, so failures only warn.
#[derive(Debug, Default)]
pub struct CompressArtifact;

#[async_trait]
impl Stage for CompressArtifact {
    fn name(&self) -> &'static str {
        "Compression"
    }

    fn severity(&self) -> Severity {
        Severity::Soft
    }

    async fn run(&self, ctx: &StageContext, input: StageInput) -> Result<StageOutput> {
        let source = input.primary(self.name())?.clone();
        let dest = ctx.workspace.compressed_path();
        let level = ctx.config.compression.level;

        let report = {
            let dest = dest.clone();
            blocking(move || sf_av::compress_gzip(&source, &dest, level)).await?
        };

        Ok(StageOutput {
            artifact: report.output.clone(),
            summary: format!("{:.1}% smaller", report.reduction_percent()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, FakeProvisioner};
    use sf_core::QualityPreset;

    #[tokio::test]
    async fn compresses_beside_artifact() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), FakeProvisioner::default());
        let ply = ctx.workspace.artifact_path();
        std::fs::write(&ply, "1.0 2.0 3.0\n".repeat(1000)).unwrap();

        let out = CompressArtifact
            .run(
                &ctx,
                StageInput {
                    inputs: vec![ply.clone()],
                    output_dir: root.path().join("models"),
                    params: QualityPreset::Fast.config(),
                },
            )
            .await
            .unwrap();

        assert_eq!(out.artifact, ctx.workspace.compressed_path());
        assert!(ply.is_file());
    }

    #[tokio::test]
    async fn missing_artifact_fails() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path(), FakeProvisioner::default());
        let result = CompressArtifact
            .run(
                &ctx,
                StageInput {
                    inputs: vec![ctx.workspace.artifact_path()],
                    output_dir: root.path().join("models"),
                    params: QualityPreset::Fast.config(),
                },
            )
            .await;
        assert!(result.is_err());
        assert!(!ctx.workspace.compressed_path().exists());
    }
}
