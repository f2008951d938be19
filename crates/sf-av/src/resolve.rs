//! Locate the file an external tool actually produced.
//!
//! Trainers write their output under run-specific subdirectories whose names
//! depend on the iteration count, the resume state and the tool version. The
//! resolver tries, in order:
//!
//! 1. a preferred relative path, if the caller gave one
//!    (e.g. `point_cloud/iteration_5000/point_cloud.ply`),
//! 2. the canonical file name at the directory root,
//! 3. the canonical file name anywhere below the directory,
//! 4. any file with the expected extension.
//!
//! Steps 3 and 4 pick the lexicographically last relative path. That equals
//! "latest iteration" only when iteration directories are zero-padded to a
//! fixed width (`iteration_005000`); with unpadded names `iteration_7000`
//! sorts after `iteration_30000`.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use sf_core::{Error, Result};

/// What to look for.
#[derive(Debug, Clone)]
pub struct ArtifactQuery {
    exact: Option<PathBuf>,
    basename: String,
    extension: String,
}

impl ArtifactQuery {
    /// Look for `basename` anywhere, falling back to its extension.
    pub fn new(basename: impl Into<String>) -> Self {
        let basename = basename.into();
        let extension = Path::new(&basename)
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            exact: None,
            basename,
            extension,
        }
    }

    /// Try this path (relative to the searched directory) first.
    pub fn prefer(mut self, relative: impl Into<PathBuf>) -> Self {
        self.exact = Some(relative.into());
        self
    }
}

/// Find the artifact described by `query` under `dir`.
///
/// # Errors
///
/// [`Error::ArtifactNotFound`] with the full recursive listing of `dir` when
/// nothing matches.
pub fn resolve_artifact(dir: &Path, query: &ArtifactQuery) -> Result<PathBuf> {
    if let Some(ref exact) = query.exact {
        let candidate = dir.join(exact);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "Resolved artifact at preferred path");
            return Ok(candidate);
        }
    }

    let root = dir.join(&query.basename);
    if root.is_file() {
        tracing::debug!(path = %root.display(), "Resolved artifact at directory root");
        return Ok(root);
    }

    let files = list_files(dir);

    let by_name = files
        .iter()
        .filter(|rel| {
            rel.file_name()
                .is_some_and(|n| n.to_string_lossy() == query.basename)
        })
        .max();
    if let Some(rel) = by_name {
        tracing::debug!(path = %rel.display(), "Resolved artifact by name");
        return Ok(dir.join(rel));
    }

    if !query.extension.is_empty() {
        let by_ext = files
            .iter()
            .filter(|rel| {
                rel.extension()
                    .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(&query.extension))
            })
            .max();
        if let Some(rel) = by_ext {
            tracing::debug!(path = %rel.display(), "Resolved artifact by extension");
            return Ok(dir.join(rel));
        }
    }

    let mut listing: Vec<String> = files
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    listing.sort();
    Err(Error::ArtifactNotFound {
        dir: dir.to_path_buf(),
        wanted: query.basename.clone(),
        listing,
    })
}

/// Every regular file below `dir`, relative to it.
fn list_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"ply").unwrap();
    }

    #[test]
    fn picks_latest_padded_iteration() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "point_cloud/iteration_001000/point_cloud.ply");
        touch(dir.path(), "point_cloud/iteration_005000/point_cloud.ply");

        let found = resolve_artifact(dir.path(), &ArtifactQuery::new("point_cloud.ply")).unwrap();
        assert_eq!(
            found,
            dir.path().join("point_cloud/iteration_005000/point_cloud.ply")
        );
    }

    #[test]
    fn preferred_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "point_cloud/iteration_2000/point_cloud.ply");
        touch(dir.path(), "point_cloud/iteration_900/point_cloud.ply");

        let query = ArtifactQuery::new("point_cloud.ply")
            .prefer("point_cloud/iteration_2000/point_cloud.ply");
        let found = resolve_artifact(dir.path(), &query).unwrap();
        assert!(found.ends_with("iteration_2000/point_cloud.ply"));
    }

    #[test]
    fn missing_preferred_path_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "model.ply");

        let query = ArtifactQuery::new("model.ply").prefer("does/not/exist.ply");
        let found = resolve_artifact(dir.path(), &query).unwrap();
        assert_eq!(found, dir.path().join("model.ply"));
    }

    #[test]
    fn root_file_beats_nested_copy() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "model.ply");
        touch(dir.path(), "snapshots/model.ply");

        let found = resolve_artifact(dir.path(), &ArtifactQuery::new("model.ply")).unwrap();
        assert_eq!(found, dir.path().join("model.ply"));
    }

    #[test]
    fn falls_back_to_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "run/a_scene.PLY");
        touch(dir.path(), "run/cameras.json");

        let found = resolve_artifact(dir.path(), &ArtifactQuery::new("point_cloud.ply")).unwrap();
        assert_eq!(found, dir.path().join("run/a_scene.PLY"));
    }

    #[test]
    fn not_found_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "cfg_args");
        touch(dir.path(), "logs/train.txt");

        let err = resolve_artifact(dir.path(), &ArtifactQuery::new("point_cloud.ply")).unwrap_err();
        match err {
            Error::ArtifactNotFound { wanted, listing, .. } => {
                assert_eq!(wanted, "point_cloud.ply");
                assert_eq!(listing, vec!["cfg_args".to_string(), "logs/train.txt".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_directory_is_not_found() {
        let err = resolve_artifact(
            Path::new("/nonexistent/model_dir"),
            &ArtifactQuery::new("point_cloud.ply"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));
    }
}
