//! Shared utility functions for CLI commands

use std::path::{Path, PathBuf};

use binrepo_core::{PathMapper, RepositoriesConfig};
use binrepo_repo::RepoKind;

use crate::error::Result;

/// Where the CLI looks for the configuration and the repository storage
#[derive(Debug, Clone, Default)]
pub struct Locations {
    pub config: Option<PathBuf>,
    pub root: Option<PathBuf>,
}

impl Locations {
    /// Path mapper for `--root`, or the platform defaults
    pub fn mapper(&self) -> Result<PathMapper> {
        match &self.root {
            Some(root) => Ok(PathMapper::under(root)),
            None => Ok(PathMapper::from_defaults()?),
        }
    }

    /// Configuration file the CLI reads
    pub fn config_file(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(self.mapper()?.config_file()),
        }
    }

    /// Load the configuration document.
    ///
    /// An explicit `--config` must exist; the default location falls back to
    /// an empty configuration.
    pub fn load_config(&self) -> Result<RepositoriesConfig> {
        let config = match &self.config {
            Some(path) => RepositoriesConfig::load_from(path)?,
            None => RepositoriesConfig::load(&self.mapper()?)?,
        };
        tracing::debug!(
            locals = config.local_repositories.len(),
            remotes = config.remote_repositories.len(),
            virtuals = config.virtual_repositories.len(),
            "configuration loaded"
        );
        Ok(config)
    }
}

/// Short label of a repository kind
#[must_use]
pub fn kind_label(kind: RepoKind) -> &'static str {
    match kind {
        RepoKind::Local => "local",
        RepoKind::Cache => "cache",
        RepoKind::Remote => "remote",
        RepoKind::Virtual => "virtual",
    }
}

/// Display a path relative to the working directory when possible
#[must_use]
pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
