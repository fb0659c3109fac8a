//! Source discovery
//!
//! Walks the configured roots and returns the compilable inputs, each paired
//! with the object it produces. The bootstrap unit and embedded resources are
//! added explicitly rather than found by the walk.

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Role of a unit in the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Regular C translation unit
    Ordinary,
    /// Architecture entry point, linked first
    Bootstrap,
    /// GAS or NASM source
    Assembly,
    /// Binary file converted to an object
    Resource,
}

/// Which tool handles a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// `.c`, via the C compiler
    C,
    /// `.S`/`.s`, preprocessed assembly via the C compiler
    Gas,
    /// `.asm`, via NASM
    Nasm,
    /// Anything embedded with objcopy
    Binary,
}

impl Language {
    /// Classify by file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "c" => Some(Self::C),
            "S" | "s" => Some(Self::Gas),
            "asm" => Some(Self::Nasm),
            _ => None,
        }
    }
}

/// A discovered input; immutable for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Absolute source path
    pub path: PathBuf,
    /// Path relative to the kernel directory
    pub rel: PathBuf,
    pub kind: SourceKind,
    pub language: Language,
    /// Absolute object path
    pub object: PathBuf,
}

impl SourceUnit {
    fn new(config: &BuildConfig, path: PathBuf, kind: SourceKind, language: Language) -> Self {
        let rel = path
            .strip_prefix(&config.kernel_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                path.strip_prefix(&config.project_root)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default())
            });
        let object = object_path(&config.obj_dir, &rel);
        Self {
            path,
            rel,
            kind,
            language,
            object,
        }
    }

    pub fn is_bootstrap(&self) -> bool {
        self.kind == SourceKind::Bootstrap
    }
}

/// `<obj_dir>/<rel>.o`, keeping the source extension so `a.c` and `a.S` differ
pub fn object_path(obj_dir: &Path, rel: &Path) -> PathBuf {
    let mut name = rel.as_os_str().to_os_string();
    name.push(".o");
    obj_dir.join(name)
}

/// Discovers source units for a build configuration
pub struct SourceDiscoverer<'a> {
    config: &'a BuildConfig,
}

impl<'a> SourceDiscoverer<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self { config }
    }

    /// All units: bootstrap (if configured), discovered sources in walk
    /// order, then embedded resources in configuration order
    pub fn discover(&self) -> BuildResult<Vec<SourceUnit>> {
        let config = self.config;
        let mut excluded: HashSet<String> = config.exclude.iter().cloned().collect();

        let mut units = Vec::new();
        if let Some(bootstrap) = &config.bootstrap {
            if !bootstrap.is_file() {
                return Err(BuildError::MissingInput {
                    path: bootstrap.clone(),
                });
            }
            let language = Language::from_path(bootstrap).ok_or_else(|| {
                BuildError::Config(format!(
                    "bootstrap unit {} has no recognized extension",
                    bootstrap.display()
                ))
            })?;
            if let Some(name) = bootstrap.file_name() {
                excluded.insert(name.to_string_lossy().to_string());
            }
            units.push(SourceUnit::new(
                config,
                bootstrap.clone(),
                SourceKind::Bootstrap,
                language,
            ));
        }

        let extensions: Vec<&str> = config.extensions.iter().map(String::as_str).collect();
        let found = discover(&config.source_roots, &extensions, &excluded)?;
        for path in found {
            // Extensions outside the known set are skipped at classification
            let Some(language) = Language::from_path(&path) else {
                continue;
            };
            let kind = match language {
                Language::C => SourceKind::Ordinary,
                _ => SourceKind::Assembly,
            };
            units.push(SourceUnit::new(config, path, kind, language));
        }

        for embed in &config.embeds {
            if !embed.source.is_file() {
                return Err(BuildError::MissingInput {
                    path: embed.source.clone(),
                });
            }
            units.push(SourceUnit::new(
                config,
                embed.source.clone(),
                SourceKind::Resource,
                Language::Binary,
            ));
        }

        Ok(units)
    }
}

/// Recursively enumerate `roots` for files whose extension is in
/// `extensions` and whose base name is not in `excluded`
///
/// Missing roots contribute nothing. Entries are visited in file-name order.
pub fn discover(
    roots: &[PathBuf],
    extensions: &[&str],
    excluded: &HashSet<String>,
) -> BuildResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for root in roots {
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                BuildError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e));
            let name = entry.file_name().to_string_lossy();
            if matches_ext && !excluded.contains(name.as_ref()) && seen.insert(path.to_path_buf())
            {
                files.push(path.to_path_buf());
            }
        }
    }

    Ok(files)
}
