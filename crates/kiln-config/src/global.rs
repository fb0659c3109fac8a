//! Global Configuration (~/.kiln/config.toml)
//!
//! Per-user defaults that apply to every project, currently the toolchain
//! (useful for cross toolchains such as `x86_64-elf-gcc`).

use crate::project::ToolchainSection;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.kiln/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Toolchain defaults, used where the project leaves a tool unset
    pub toolchain: ToolchainSection,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let tc = &self.toolchain;
        for (field, value) in [("cc", &tc.cc), ("ld", &tc.ld), ("nasm", &tc.nasm), ("objcopy", &tc.objcopy)] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("toolchain.{}", field),
                    reason: "tool path cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get the global config file path (~/.kiln/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".kiln").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_toolchain() {
        let toml = r#"
[toolchain]
cc = "x86_64-elf-gcc"
ld = "x86_64-elf-ld"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.toolchain.cc(), "x86_64-elf-gcc");
        assert_eq!(config.toolchain.nasm(), "nasm");
    }

    #[test]
    fn test_empty_tool_is_invalid() {
        let config = GlobalConfig {
            toolchain: ToolchainSection {
                ld: Some("  ".to_string()),
                ..Default::default()
            },
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = GlobalConfig::load_from_file(Path::new("/nonexistent/kiln/config.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
