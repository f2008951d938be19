//! Configuration file discovery.
//!
//! The [`Config`] type itself lives in `sf-core`; this module finds the file
//! on disk and reports non-fatal problems through `tracing`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use sf_core::config::Config;

/// Locations searched when no `--config` is given, in order.
const DEFAULT_PATHS: &[&str] = &[
    "./splatforge.toml",
    "~/.config/splatforge/config.toml",
    "/etc/splatforge/config.toml",
];

/// Load configuration from a TOML file, logging any validation warnings.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))?;

    for warning in config.validate() {
        tracing::warn!("Config {}: {warning}", path.display());
    }

    Ok(config)
}

/// The default search paths with `~` expanded.
pub fn default_paths() -> Vec<PathBuf> {
    DEFAULT_PATHS
        .iter()
        .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
        .collect()
}

/// Load config from `custom_path`, else the first default location that
/// exists, else built-in defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path in default_paths() {
        if path.exists() {
            tracing::debug!("Using config file {}", path.display());
            return load_config(&path);
        }
    }

    tracing::debug!("No config file found; using defaults");
    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[storage]\nroot = \"/srv/splats\"\n\n[processing]\ndefault_preset = \"quality\"\nexport_mesh = true"
        )
        .unwrap();

        let config = load_config_or_default(Some(file.path())).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/srv/splats"));
        assert!(config.processing.export_mesh);
        assert_eq!(
            config.processing.default_preset,
            sf_core::QualityPreset::Quality
        );
        // Untouched sections keep their defaults.
        assert!(config.compression.enabled);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_config_or_default(Some(Path::new("/nonexistent/splatforge.toml")))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to load config file"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[processing\nexport_mesh = ").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn default_search_order() {
        let paths = default_paths();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], PathBuf::from("./splatforge.toml"));
        assert_eq!(paths[2], PathBuf::from("/etc/splatforge/config.toml"));
    }
}
