//! Locating the executables the pipeline shells out to.
//!
//! [`ToolRegistry`] resolves ffmpeg, ffprobe and a Python interpreter once at
//! startup; stages look them up by name and get a `Tool` error when missing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sf_core::config::ToolsConfig;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";
pub const PYTHON: &str = "python";

/// Everything `discover` looks for, in report order.
const KNOWN_TOOLS: &[&str] = &[FFMPEG, FFPROBE, PYTHON];

/// Executables tried for [`PYTHON`], in order. The trainer is pinned to 3.10
/// upstream, so prefer that when present.
const PYTHON_CANDIDATES: &[&str] = &["python3.10", "python3", "python"];

/// A tool that was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub path: PathBuf,
}

/// One row of the `check-tools` report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First non-empty line the tool printed for its version flag.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved tool paths keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Resolve every known tool. A configured path wins when it exists,
    /// otherwise `PATH` is searched. Missing tools are simply absent and
    /// surface later through [`require`](Self::require).
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let configured = match name {
                FFMPEG => tools_config.ffmpeg_path.as_deref(),
                FFPROBE => tools_config.ffprobe_path.as_deref(),
                PYTHON => tools_config.python_path.as_deref(),
                _ => None,
            };

            let resolved = match configured {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = name, path = %p.display(), "Configured tool path does not exist; searching PATH");
                    search_path(name)
                }
                None => search_path(name),
            };

            if let Some(path) = resolved {
                tracing::debug!(tool = name, path = %path.display(), "Discovered tool");
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                    },
                );
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths, skipping discovery.
    pub fn from_paths<I, S, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        let tools = entries
            .into_iter()
            .map(|(name, path)| {
                let name = name.into();
                (
                    name.clone(),
                    ToolConfig {
                        name,
                        path: path.into(),
                    },
                )
            })
            .collect();
        Self { tools }
    }

    /// The tool, or a `Tool` error naming it.
    pub fn require(&self, name: &str) -> sf_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            sf_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Availability of every known tool, probing versions of the ones found.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(name, &cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

fn search_path(name: &str) -> Option<PathBuf> {
    if name == PYTHON {
        return PYTHON_CANDIDATES
            .iter()
            .find_map(|candidate| which::which(candidate).ok());
    }
    which::which(name).ok()
}

/// First non-empty line of `<tool> -version` (`--version` for Python).
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let flag = if name == PYTHON { "--version" } else { "-version" };
    let output = std::process::Command::new(path).arg(flag).output().ok()?;
    if !output.status.success() {
        return None;
    }

    // Older Pythons print their version on stderr.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
