//! Built-in pipeline stages.
//!
//! Each stage wraps one external tool or one [`sf_av`] helper behind the
//! unified [`Stage`](crate::stage::Stage) trait.

mod compress;
mod export;
mod extract;
mod mesh;
mod train;

pub use compress::CompressArtifact;
pub use export::ExportPly;
pub use extract::ExtractFrames;
pub use mesh::ExportMesh;
pub use train::TrainSplat;

use std::path::{Path, PathBuf};

use sf_core::{Error, Result};

/// Image files directly inside `dir`, sorted by name.
pub(crate) fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|e| {
                    let e = e.to_string_lossy();
                    e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("png")
                })
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// Run blocking filesystem work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))?
}
