//! Gzip compression of output artifacts.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tempfile::NamedTempFile;

use sf_core::{Error, Result};

/// Size accounting for one compressed file.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionReport {
    pub output: PathBuf,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

impl CompressionReport {
    /// Percentage saved, `0.0` for an empty input.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_bytes as f64 / self.original_bytes as f64) * 100.0
    }
}

/// `model.ply` -> `model.ply.gz`.
pub fn gzip_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

/// Stream `input` through gzip into `output`.
///
/// The output is written to a temp file next to it and renamed into place,
/// so a partial `.gz` never appears. `input` is left untouched. Levels above
/// 9 are clamped.
pub fn compress_gzip(input: &Path, output: &Path, level: u32) -> Result<CompressionReport> {
    let original_bytes = std::fs::metadata(input)?.len();
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let compression = match level {
        0 => Compression::none(),
        1 => Compression::fast(),
        9..=u32::MAX => Compression::best(),
        level => Compression::new(level),
    };

    let tmp = NamedTempFile::new_in(dir)?;
    let mut reader = BufReader::new(File::open(input)?);
    let mut encoder = GzEncoder::new(BufWriter::new(tmp), compression);
    io::copy(&mut reader, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    let tmp = writer
        .into_inner()
        .map_err(|e| Error::Io { source: e.into_error() })?;
    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| Error::Io { source: e.error })?;

    let compressed_bytes = std::fs::metadata(output)?.len();
    let report = CompressionReport {
        output: output.to_path_buf(),
        original_bytes,
        compressed_bytes,
    };

    tracing::info!(
        input = %input.display(),
        "Compressed {:.1}KB -> {:.1}KB ({:.1}% reduction)",
        original_bytes as f64 / 1024.0,
        compressed_bytes as f64 / 1024.0,
        report.reduction_percent()
    );

    Ok(report)
}
