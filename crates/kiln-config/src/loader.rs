//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::KilnConfig;
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.kiln/config.toml) - lowest priority
/// 2. Project config (./kiln.toml) - overrides global
/// 3. Environment variables (CC, LD, KILN_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective project configuration, global and environment merged in
    pub project: KilnConfig,

    /// Global configuration as loaded
    pub global: GlobalConfig,

    /// Project root directory (where kiln.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use a specific global config file instead of ~/.kiln/config.toml
    pub fn with_global_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find kiln.toml. When none is found the
    /// defaults are used and `project_root` is `None`.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        self.finish(project, project_root)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = KilnConfig::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.finish(project, project_root)
    }

    fn finish(
        &mut self,
        mut project: KilnConfig,
        project_root: Option<PathBuf>,
    ) -> ConfigResult<Config> {
        // Global config is optional
        let global = self.load_global_config().unwrap_or_default();
        project.toolchain.merge_under(&global.toolchain);

        let project = apply_env_overrides(project)?;
        project.validate()?;

        Ok(Config {
            project,
            global,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, KilnConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = KilnConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, KilnConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.kiln/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Get the global configuration directory (~/.kiln)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".kiln"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment variable overrides
///
/// `CC` and `LD` select the compiler and linker, as kernel makefiles do.
/// `KILN_JOBS` sets the worker count and `KILN_INCREMENTAL` toggles the cache.
fn apply_env_overrides(mut config: KilnConfig) -> ConfigResult<KilnConfig> {
    if let Ok(cc) = env::var("CC") {
        if !cc.trim().is_empty() {
            config.toolchain.cc = Some(cc);
        }
    }

    if let Ok(ld) = env::var("LD") {
        if !ld.trim().is_empty() {
            config.toolchain.ld = Some(ld);
        }
    }

    if let Ok(jobs) = env::var("KILN_JOBS") {
        config.build.jobs = jobs.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "KILN_JOBS".to_string(),
            reason: format!("'{}' is not a number", jobs),
        })?;
    }

    if let Ok(incremental) = env::var("KILN_INCREMENTAL") {
        config.build.incremental =
            matches!(incremental.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    Ok(config)
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has kiln.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// OS name from the project config
    pub fn os_name(&self) -> &str {
        &self.project.os.name
    }
}
