//! Kiln Configuration System
//!
//! Provides configuration management for kiln kernel projects:
//! - Project configuration (kiln.toml)
//! - Global user configuration (~/.kiln/config.toml)
//! - Environment overrides
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults (every field has one)
//! 2. Global config (~/.kiln/config.toml), toolchain section only
//! 3. Project config (./kiln.toml)
//! 4. Environment variables (CC, LD, KILN_*)
//! 5. CLI flags (applied by the build crate when resolving)
//!
//! Unknown keys are ignored and missing keys take their default, so an old
//! `kiln.toml` keeps loading as the schema grows.
//!
//! # Example
//!
//! ```no_run
//! use kiln_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("building {}", config.project.os.name);
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Current schema version written by `kiln init`
pub const SCHEMA_VERSION: u32 = 1;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unsupported schema version {found} (this kiln understands up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::{
    BuildSection, CompileSection, EmbedEntry, FlagOverride, ImageSection, KilnConfig, LinkSection,
    LoaderFile, OsSection, PathsSection, PostprocessSection, ToolchainSection,
};
