//! Secondary OBJ export.

use async_trait::async_trait;

use sf_core::{Result, Severity};

use super::blocking;
use crate::context::StageContext;
use crate::stage::{Stage, StageInput, StageOutput};

/// Write the model's vertex positions to `models/<id>.obj`. Optional output,
/// so failures only warn.
#[derive(Debug, Default)]
pub struct ExportMesh;

#[async_trait]
impl Stage for ExportMesh {
    fn name(&self) -> &'static str {
        "Mesh export"
    }

    fn severity(&self) -> Severity {
        Severity::Soft
    }

    async fn run(&self, ctx: &StageContext, input: StageInput) -> Result<StageOutput> {
        let ply = input.primary(self.name())?.clone();
        let obj = ctx.workspace.mesh_path();

        let vertices = {
            let obj = obj.clone();
            blocking(move || sf_av::ply_to_obj(&ply, &obj)).await?
        };

        tracing::info!(job_id = %ctx.job_id, obj = %obj.display(), vertices, "Exported mesh");
        Ok(StageOutput {
            artifact: obj,
            summary: format!("Wrote {vertices} vertices"),
        })
    }
}
