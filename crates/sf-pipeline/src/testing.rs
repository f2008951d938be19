//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use sf_av::{JobWorkspace, Provisioner, ToolRegistry};
use sf_core::config::Config;
use sf_core::{Error, JobId, Result};

use crate::context::StageContext;

/// Provisioner backed by a fixed name -> path table.
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    paths: HashMap<String, PathBuf>,
}

impl FakeProvisioner {
    pub fn with(mut self, tool: &str, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(tool.to_string(), path.into());
        self
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn ensure(&self, tool: &str) -> Result<PathBuf> {
        self.paths
            .get(tool)
            .cloned()
            .ok_or_else(|| Error::tool(tool, "not provisioned"))
    }
}

/// Config rooted at `root`.
pub fn config(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.root = root.to_path_buf();
    config
}

/// A prepared workspace and context for a fresh job under `root`.
pub fn context(root: &Path, provisioner: FakeProvisioner) -> StageContext {
    let config = config(root);
    let workspace = JobWorkspace::new(&config.storage, JobId::new());
    workspace.prepare().unwrap();
    StageContext::new(
        Arc::new(workspace),
        Arc::new(ToolRegistry::default()),
        Arc::new(provisioner),
        Arc::new(config),
    )
}

/// Write an executable `sh` script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
