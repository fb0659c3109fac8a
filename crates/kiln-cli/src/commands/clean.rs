//! Clean command - remove derived artifacts

use crate::console::{ConsoleSink, Verbosity};
use anyhow::{Context, Result};
use kiln_build::{BuildOverrides, Pipeline};
use std::path::Path;
use std::sync::Arc;

pub fn run(project_dir: &Path, deep: bool, verbose: bool) -> Result<()> {
    let config = super::resolve_config(project_dir, &BuildOverrides::default())?;
    let pipeline = Pipeline::new(config).with_sink(Arc::new(ConsoleSink::new(
        Verbosity::from_flags(false, verbose),
    )));

    let removed = pipeline
        .clean(deep)
        .context("Failed to clean build artifacts")?;

    if removed.is_empty() {
        println!("Nothing to clean");
    } else {
        for path in &removed {
            println!("  removed {}", pipeline.config().display_path(path).display());
        }
        println!("Removed {} item(s)", removed.len());
    }
    Ok(())
}
