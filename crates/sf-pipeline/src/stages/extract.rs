//! Frame sampling with ffmpeg.

use async_trait::async_trait;

use sf_av::tools::FFMPEG;
use sf_core::{Error, Result};

use super::list_frames;
use crate::context::StageContext;
use crate::stage::{Stage, StageInput, StageOutput};

/// Sample the input video at the preset's rate into numbered JPEGs.
#[derive(Debug, Default)]
pub struct ExtractFrames;

#[async_trait]
impl Stage for ExtractFrames {
    fn name(&self) -> &'static str {
        "Frame extraction"
    }

    async fn run(&self, ctx: &StageContext, input: StageInput) -> Result<StageOutput> {
        let video = input.primary(self.name())?;
        let ffmpeg = ctx.provisioner.ensure(FFMPEG).await?;
        std::fs::create_dir_all(&input.output_dir)?;

        let pattern = input.output_dir.join("frame_%06d.jpg");
        let fps = input.params.sampling_fps;
        tracing::info!(
            job_id = %ctx.job_id,
            video = %video.display(),
            "Extracting frames at {fps} fps"
        );

        ctx.command(ffmpeg)
            .label(FFMPEG)
            .args(["-y", "-i"])
            .arg(video.to_string_lossy())
            .args(["-vf".to_string(), format!("fps={fps}")])
            .args(["-q:v", "2"])
            .arg(pattern.to_string_lossy())
            .execute()
            .await?;

        let frames = list_frames(&input.output_dir)?;
        if frames.is_empty() {
            return Err(Error::tool(FFMPEG, "no frames were extracted"));
        }

        tracing::info!(job_id = %ctx.job_id, count = frames.len(), "Frames extracted");
        Ok(StageOutput {
            artifact: input.output_dir.clone(),
            summary: format!("Extracted {} frames at {fps} fps", frames.len()),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{context, write_script, FakeProvisioner};
    use sf_core::QualityPreset;

    #[tokio::test]
    async fn produces_frames_directory() {
        let root = tempfile::tempdir().unwrap();
        // Last argument is the output pattern; drop three frames beside it.
        let ffmpeg = write_script(
            root.path(),
            "ffmpeg",
            r#"for a in "$@"; do out="$a"; done
dir=$(dirname "$out")
for i in 1 2 3; do echo jpg > "$dir/frame_00000$i.jpg"; done"#,
        );
        let ctx = context(root.path(), FakeProvisioner::default().with(FFMPEG, ffmpeg));
        let video = root.path().join("clip.mp4");
        std::fs::write(&video, b"mp4").unwrap();

        let out = ExtractFrames
            .run(
                &ctx,
                StageInput {
                    inputs: vec![video],
                    output_dir: ctx.workspace.frames_dir(),
                    params: QualityPreset::Balanced.config(),
                },
            )
            .await
            .unwrap();

        assert_eq!(out.artifact, ctx.workspace.frames_dir());
        assert_eq!(out.summary, "Extracted 3 frames at 2 fps");
    }

    #[tokio::test]
    async fn no_frames_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(root.path(), "ffmpeg", "exit 0");
        let ctx = context(root.path(), FakeProvisioner::default().with(FFMPEG, ffmpeg));

        let err = ExtractFrames
            .run(
                &ctx,
                StageInput {
                    inputs: vec![root.path().join("clip.mp4")],
                    output_dir: ctx.workspace.frames_dir(),
                    params: QualityPreset::Fast.config(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no frames"), "got: {err}");
    }

    #[tokio::test]
    async fn ffmpeg_failure_carries_output() {
        let root = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(
            root.path(),
            "ffmpeg",
            "echo 'clip.mp4: Invalid data found when processing input' >&2; exit 1",
        );
        let ctx = context(root.path(), FakeProvisioner::default().with(FFMPEG, ffmpeg));

        let err = ExtractFrames
            .run(
                &ctx,
                StageInput {
                    inputs: vec![root.path().join("clip.mp4")],
                    output_dir: ctx.workspace.frames_dir(),
                    params: QualityPreset::Fast.config(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProcessExit { .. }));
        assert!(err.to_string().contains("Invalid data found"));
    }
}
