//! Gaussian-splat training.
//!
//! The trainer is a Python checkout with a `train.py` entry point. It reads a
//! scene directory containing `images/`, writes iteration snapshots under
//! `point_cloud/iteration_N/point_cloud.ply` in the model directory, and
//! serves a network viewer on a TCP port we must pick for it.

use std::path::Path;

use async_trait::async_trait;

use sf_av::tools::PYTHON;
use sf_av::{resolve_artifact, ArtifactQuery, Capture, TRAINER};
use sf_core::{Error, Result};

use super::{blocking, list_frames};
use crate::context::StageContext;
use crate::stage::{Stage, StageInput, StageOutput};

/// Canonical name of the model copied into the model directory.
pub const MODEL_FILE: &str = "model.ply";

const TRAIN_SCRIPT: &str = "train.py";
const POINT_CLOUD: &str = "point_cloud.ply";
const WINDOW_SIZE: &str = "3";
const PORT_BASE: u16 = 6010;
const PORT_SPAN: u64 = 59000;

/// Run the trainer over the extracted frames.
#[derive(Debug, Default)]
pub struct TrainSplat;

#[async_trait]
impl Stage for TrainSplat {
    fn name(&self) -> &'static str {
        "Training"
    }

    async fn run(&self, ctx: &StageContext, input: StageInput) -> Result<StageOutput> {
        let frames_dir = input.primary(self.name())?.clone();
        let repo = ctx.provisioner.ensure(TRAINER).await?;
        let python = ctx.provisioner.ensure(PYTHON).await?;

        let scene = ctx.workspace.scene_dir();
        let result = train(ctx, &input, &frames_dir, &repo, &python, &scene).await;

        if scene.exists() {
            if let Err(e) = std::fs::remove_dir_all(&scene) {
                tracing::warn!(job_id = %ctx.job_id, scene = %scene.display(), "Failed to remove scene directory: {e}");
            }
        }
        result
    }
}

async fn train(
    ctx: &StageContext,
    input: &StageInput,
    frames_dir: &Path,
    repo: &Path,
    python: &Path,
    scene: &Path,
) -> Result<StageOutput> {
    let frame_count = {
        let frames_dir = frames_dir.to_path_buf();
        let scene = scene.to_path_buf();
        blocking(move || prepare_scene(&frames_dir, &scene)).await?
    };
    if frame_count == 0 {
        return Err(Error::tool(
            TRAINER,
            format!("no frames found in {}", frames_dir.display()),
        ));
    }

    let model_dir = &input.output_dir;
    std::fs::create_dir_all(model_dir)?;

    let params = &input.params;
    let init_frames = params.init_frames(frame_count);
    let port = viewer_port(model_dir);
    let log = ctx.workspace.train_log();

    tracing::info!(
        job_id = %ctx.job_id,
        frames = frame_count,
        iterations = params.iterations,
        init_frames,
        port,
        log = %log.display(),
        "Starting trainer"
    );

    ctx.command(python)
        .label(TRAINER)
        .arg(repo.join(TRAIN_SCRIPT).to_string_lossy())
        .arg("-s")
        .arg(scene.to_string_lossy())
        .arg("-m")
        .arg(model_dir.to_string_lossy())
        .args(["--iterations".to_string(), params.iterations.to_string()])
        .args(["--resolution".to_string(), params.resolution_divisor.to_string()])
        .args(["--mode", "custom"])
        .args(["--port".to_string(), port.to_string()])
        .arg("--quiet")
        .args(["--init_frame_num".to_string(), init_frames.to_string()])
        .args(["--window_size", WINDOW_SIZE])
        .current_dir(repo)
        .env("PYTHONPATH", python_path(repo))
        .capture(Capture::Streamed(log))
        .execute()
        .await?;

    let query = ArtifactQuery::new(POINT_CLOUD).prefer(
        Path::new("point_cloud")
            .join(format!("iteration_{}", params.iterations))
            .join(POINT_CLOUD),
    );
    let point_cloud = resolve_artifact(model_dir, &query)?;
    let model = model_dir.join(MODEL_FILE);
    {
        let (from, to) = (point_cloud.clone(), model.clone());
        blocking(move || {
            std::fs::copy(&from, &to)?;
            Ok(())
        })
        .await?;
    }

    tracing::info!(job_id = %ctx.job_id, point_cloud = %point_cloud.display(), "Training finished");
    Ok(StageOutput {
        artifact: model,
        summary: format!(
            "Trained {} iterations on {frame_count} frames",
            params.iterations
        ),
    })
}

/// Copy the frames into a fresh `<scene>/images` directory and return how
/// many were copied.
fn prepare_scene(frames_dir: &Path, scene: &Path) -> Result<usize> {
    if scene.exists() {
        std::fs::remove_dir_all(scene)?;
    }
    let images = scene.join("images");
    std::fs::create_dir_all(&images)?;

    let frames = list_frames(frames_dir)?;
    for frame in &frames {
        if let Some(name) = frame.file_name() {
            std::fs::copy(frame, images.join(name))?;
        }
    }
    Ok(frames.len())
}

/// `repo` prepended to any inherited `PYTHONPATH`.
fn python_path(repo: &Path) -> String {
    let repo = repo.to_string_lossy().to_string();
    match std::env::var("PYTHONPATH") {
        Ok(existing) if existing.split(':').any(|p| p == repo) => existing,
        Ok(existing) if !existing.is_empty() => format!("{repo}:{existing}"),
        _ => repo,
    }
}

/// Viewer port derived from the model directory, in `6010..=65009`.
///
/// Concurrent jobs train into different directories, so they rarely collide
/// on the port. FNV-1a keeps the value stable across builds.
pub fn viewer_port(model_dir: &Path) -> u16 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in model_dir.to_string_lossy().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    // hash % PORT_SPAN < 59000, so the sum fits in u16.
    PORT_BASE + (hash % PORT_SPAN) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_is_stable_and_in_range() {
        let a = viewer_port(Path::new("/srv/models/a"));
        assert_eq!(a, viewer_port(Path::new("/srv/models/a")));
        for dir in ["/a", "/srv/models/b", "", "/x/y/z/0123456789"] {
            let p = viewer_port(Path::new(dir));
            assert!((6010..=65009).contains(&p), "{dir} -> {p}");
        }
    }

    #[test]
    fn scene_gets_only_images() {
        let tmp = tempfile::tempdir().unwrap();
        let frames = tmp.path().join("frames");
        std::fs::create_dir(&frames).unwrap();
        std::fs::write(frames.join("frame_000001.jpg"), b"1").unwrap();
        std::fs::write(frames.join("frame_000002.png"), b"2").unwrap();
        std::fs::write(frames.join("list.txt"), b"x").unwrap();

        let scene = tmp.path().join("scene");
        std::fs::create_dir_all(scene.join("images")).unwrap();
        std::fs::write(scene.join("images/stale.jpg"), b"old").unwrap();

        assert_eq!(prepare_scene(&frames, &scene).unwrap(), 2);
        assert!(scene.join("images/frame_000002.png").is_file());
        assert!(!scene.join("images/stale.jpg").exists());
    }

    #[cfg(unix)]
    mod with_fake_trainer {
        use super::super::*;
        use std::path::PathBuf;
        use crate::testing::{context, write_script, FakeProvisioner};
        use sf_core::QualityPreset;

        /// Writes a snapshot for the requested iteration count, after
        /// checking the scene has images.
        const FAKE_PYTHON: &str = r#"shift
while [ $# -gt 0 ]; do
  case "$1" in
    -s) scene="$2"; shift ;;
    -m) out="$2"; shift ;;
    --iterations) it="$2"; shift ;;
  esac
  shift
done
ls "$scene/images" | grep -q . || { echo "empty scene" >&2; exit 3; }
mkdir -p "$out/point_cloud/iteration_$it"
echo "ply from $it" > "$out/point_cloud/iteration_$it/point_cloud.ply"
echo "training done""#;

        fn setup(root: &Path, python_body: &str) -> (StageContext, PathBuf) {
            let repo = root.join("trainer");
            std::fs::create_dir_all(&repo).unwrap();
            std::fs::write(repo.join("train.py"), "").unwrap();
            let python = write_script(root, "python", python_body);
            let ctx = context(
                root,
                FakeProvisioner::default()
                    .with(TRAINER, repo)
                    .with(PYTHON, python),
            );
            let frames = ctx.workspace.frames_dir();
            for i in 1..=4 {
                std::fs::write(frames.join(format!("frame_{i:06}.jpg")), b"jpg").unwrap();
            }
            (ctx, frames)
        }

        #[tokio::test]
        async fn copies_model_and_removes_scene() {
            let root = tempfile::tempdir().unwrap();
            let (ctx, frames) = setup(root.path(), FAKE_PYTHON);

            let out = TrainSplat
                .run(
                    &ctx,
                    StageInput {
                        inputs: vec![frames],
                        output_dir: ctx.workspace.model_dir(),
                        params: QualityPreset::Fast.config(),
                    },
                )
                .await
                .unwrap();

            assert_eq!(out.artifact, ctx.workspace.model_dir().join(MODEL_FILE));
            assert_eq!(
                std::fs::read_to_string(&out.artifact).unwrap(),
                "ply from 2000\n"
            );
            assert!(!ctx.workspace.scene_dir().exists());
            let log = std::fs::read_to_string(ctx.workspace.train_log()).unwrap();
            assert!(log.contains("training done"));
        }

        #[tokio::test]
        async fn failure_removes_scene_and_reports_tail() {
            let root = tempfile::tempdir().unwrap();
            let (ctx, frames) = setup(
                root.path(),
                "echo 'CUDA out of memory' >&2; exit 1",
            );

            let err = TrainSplat
                .run(
                    &ctx,
                    StageInput {
                        inputs: vec![frames],
                        output_dir: ctx.workspace.model_dir(),
                        params: QualityPreset::Fast.config(),
                    },
                )
                .await
                .unwrap_err();

            assert!(err.to_string().contains("CUDA out of memory"), "got: {err}");
            assert!(!ctx.workspace.scene_dir().exists());
        }

        #[tokio::test]
        async fn missing_output_lists_model_dir() {
            let root = tempfile::tempdir().unwrap();
            let (ctx, frames) = setup(root.path(), "echo ok");

            let err = TrainSplat
                .run(
                    &ctx,
                    StageInput {
                        inputs: vec![frames],
                        output_dir: ctx.workspace.model_dir(),
                        params: QualityPreset::Fast.config(),
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, Error::ArtifactNotFound { .. }), "got: {err}");
        }
    }
}
