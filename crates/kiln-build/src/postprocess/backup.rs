//! Timestamped archive copies of the packaged image

use crate::error::{BuildError, BuildResult};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// Keep ASCII alphanumerics and `._-`, drop everything else
pub fn sanitize(part: &str) -> String {
    part.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// `<name>.<version>-<YYYYmmdd-HHMMSS>.<ext>`
pub fn backup_name(name: &str, version: &str, extension: &str, at: DateTime<Local>) -> String {
    let mut file = format!(
        "{}.{}-{}",
        sanitize(name),
        sanitize(version),
        at.format("%Y%m%d-%H%M%S")
    );
    if !extension.is_empty() {
        file.push('.');
        file.push_str(extension);
    }
    file
}

/// Copy `image` into `dir`; returns the archive path
pub fn backup_image(
    image: &Path,
    dir: &Path,
    name: &str,
    version: &str,
    at: DateTime<Local>,
) -> BuildResult<PathBuf> {
    if !image.is_file() {
        return Err(BuildError::MissingInput {
            path: image.to_path_buf(),
        });
    }
    fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;

    let extension = image
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let dest = dir.join(backup_name(name, version, &extension, at));
    fs::copy(image, &dest).map_err(|e| BuildError::io(&dest, e))?;
    Ok(dest)
}
