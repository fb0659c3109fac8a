pub mod build;
pub mod clean;
pub mod history;
pub mod init;

use anyhow::{Context, Result};
use kiln_build::{BuildConfig, BuildOverrides};
use kiln_config::ConfigLoader;
use std::path::Path;

/// Load `kiln.toml` (walking up from `dir`) and resolve it for the pipeline
///
/// Without a project file the defaults apply with `dir` as the root.
pub fn resolve_config(dir: &Path, overrides: &BuildOverrides) -> Result<BuildConfig> {
    let loaded = ConfigLoader::new()
        .load_from_directory(dir)
        .context("Failed to load kiln.toml")?;
    let root = loaded.project_root().unwrap_or(dir);
    BuildConfig::resolve(root, &loaded.project, overrides).context("Invalid build configuration")
}
