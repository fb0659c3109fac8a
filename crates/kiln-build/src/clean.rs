//! Removal of derived artifacts

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::postprocess::compress::compressed_path;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Paths a clean removes, in removal order
pub fn clean_targets(config: &BuildConfig, deep: bool) -> Vec<PathBuf> {
    let mut targets = vec![
        config.obj_dir.clone(),
        config.linked_image.clone(),
        config.raw_binary.clone(),
    ];
    if let Some(image) = &config.image {
        targets.push(image.root.clone());
        targets.push(image.output.clone());
        targets.push(compressed_path(&image.output));
    }
    if deep {
        targets.push(config.state_dir.clone());
    }
    targets
}

/// Remove derived artifacts; returns what actually existed and was removed
///
/// Sources are never touched. Fingerprints and history survive unless
/// `deep` is set.
pub fn clean(config: &BuildConfig, deep: bool) -> BuildResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for target in clean_targets(config, deep) {
        if remove(&target)? {
            removed.push(target);
        }
    }
    Ok(removed)
}

fn remove(path: &Path) -> BuildResult<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(BuildError::io(path, e)),
    };
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| BuildError::io(path, e))?;
    Ok(true)
}
