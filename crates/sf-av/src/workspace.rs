//! Per-job file layout.
//!
//! A [`JobWorkspace`] names every path a job reads or writes under the
//! storage root, so stages never build paths by hand:
//!
//! ```text
//! uploads/<id>.mp4                  stored input
//! frames/<id>/frame_000001.jpg      extracted frames
//! frames/trainer_scene_<id>/images  scratch scene handed to the trainer
//! models/<id>/                      trainer output directory
//! models/<id>.ply                   primary artifact
//! models/<id>.ply.gz                compressed artifact
//! models/<id>.obj                   mesh export
//! logs/<id>-train.log               trainer output
//! ```

use std::path::{Path, PathBuf};

use sf_core::config::StorageConfig;
use sf_core::JobId;

use crate::compress::gzip_path_for;

#[derive(Debug, Clone)]
pub struct JobWorkspace {
    id: JobId,
    uploads: PathBuf,
    frames: PathBuf,
    models: PathBuf,
    logs: PathBuf,
}

impl JobWorkspace {
    pub fn new(storage: &StorageConfig, id: JobId) -> Self {
        Self {
            id,
            uploads: storage.uploads_dir(),
            frames: storage.frames_dir(),
            models: storage.models_dir(),
            logs: storage.logs_dir(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Stored input, keeping the caller's extension (lowercased).
    pub fn input_path(&self, source: &Path) -> PathBuf {
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();
        self.uploads.join(format!("{}{ext}", self.id))
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.frames.join(self.id.to_string())
    }

    pub fn scene_dir(&self) -> PathBuf {
        self.frames.join(format!("trainer_scene_{}", self.id))
    }

    pub fn model_dir(&self) -> PathBuf {
        self.models.join(self.id.to_string())
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.models.join(format!("{}.ply", self.id))
    }

    pub fn compressed_path(&self) -> PathBuf {
        gzip_path_for(&self.artifact_path())
    }

    pub fn mesh_path(&self) -> PathBuf {
        self.models.join(format!("{}.obj", self.id))
    }

    pub fn train_log(&self) -> PathBuf {
        self.logs.join(format!("{}-train.log", self.id))
    }

    /// Create the directories stages write into.
    pub fn prepare(&self) -> std::io::Result<()> {
        for dir in [
            self.uploads.clone(),
            self.frames_dir(),
            self.model_dir(),
            self.logs.clone(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Remove extracted frames and any leftover trainer scene.
    pub fn cleanup_frames(&self) {
        for dir in [self.frames_dir(), self.scene_dir()] {
            if dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!(job_id = %self.id, dir = %dir.display(), "Failed to remove directory: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(root: &Path) -> JobWorkspace {
        let storage = StorageConfig {
            root: root.to_path_buf(),
        };
        JobWorkspace::new(&storage, JobId::new())
    }

    #[test]
    fn layout_is_keyed_by_id() {
        let ws = workspace(Path::new("/srv"));
        let id = ws.id();
        assert_eq!(ws.artifact_path(), PathBuf::from(format!("/srv/models/{id}.ply")));
        assert_eq!(ws.compressed_path(), PathBuf::from(format!("/srv/models/{id}.ply.gz")));
        assert_eq!(ws.mesh_path(), PathBuf::from(format!("/srv/models/{id}.obj")));
        assert_eq!(ws.train_log(), PathBuf::from(format!("/srv/logs/{id}-train.log")));
        assert_eq!(
            ws.scene_dir(),
            PathBuf::from(format!("/srv/frames/trainer_scene_{id}"))
        );
    }

    #[test]
    fn input_keeps_lowercased_extension() {
        let ws = workspace(Path::new("/srv"));
        let id = ws.id();
        assert_eq!(
            ws.input_path(Path::new("/home/me/Walkthrough.MP4")),
            PathBuf::from(format!("/srv/uploads/{id}.mp4"))
        );
        assert_eq!(
            ws.input_path(Path::new("noext")),
            PathBuf::from(format!("/srv/uploads/{id}"))
        );
    }

    #[test]
    fn prepare_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        ws.prepare().unwrap();
        assert!(ws.frames_dir().is_dir());
        assert!(ws.model_dir().is_dir());

        std::fs::write(ws.frames_dir().join("frame_000001.jpg"), b"jpg").unwrap();
        ws.cleanup_frames();
        assert!(!ws.frames_dir().exists());
        assert!(ws.model_dir().is_dir());
    }
}
