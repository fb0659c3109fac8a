//! Build profile management
//!
//! Provides the dev and release profiles, which pick the optimization level,
//! debug info and cache policy before CLI toggles are applied.

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optimization level for compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptLevel {
    /// No optimization
    O0,
    /// Basic optimization
    O1,
    /// Full optimization (kernel default)
    O2,
    /// Aggressive optimization
    O3,
    /// Optimize for size
    Os,
}

impl OptLevel {
    /// Compiler flag for this level
    pub fn flag(&self) -> &'static str {
        match self {
            Self::O0 => "-O0",
            Self::O1 => "-O1",
            Self::O2 => "-O2",
            Self::O3 => "-O3",
            Self::Os => "-Os",
        }
    }

    /// Parse `0`..`3`, `s`, or the same with an `O`/`-O` prefix
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> BuildResult<Self> {
        let level = s.trim_start_matches('-').trim_start_matches(['O', 'o']);
        match level {
            "0" => Ok(Self::O0),
            "1" => Ok(Self::O1),
            "2" => Ok(Self::O2),
            "3" => Ok(Self::O3),
            "s" | "S" => Ok(Self::Os),
            _ => Err(BuildError::Config(format!(
                "invalid optimization level '{}': expected 0, 1, 2, 3 or s",
                s
            ))),
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

/// Build profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Development profile (default)
    #[default]
    Dev,
    /// Release profile: no debug info, always a clean rebuild
    Release,
}

impl Profile {
    /// Parse profile from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> BuildResult<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "debug" => Ok(Self::Dev),
            "release" => Ok(Self::Release),
            other => Err(BuildError::Config(format!(
                "unknown profile '{}': expected dev or release",
                other
            ))),
        }
    }

    /// Get profile name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Release => "release",
        }
    }

    /// Get default configuration for this profile
    pub fn default_config(&self) -> ProfileConfig {
        match self {
            Self::Dev => ProfileConfig {
                name: "dev".to_string(),
                opt_level: OptLevel::O2,
                debug_info: true,
                parallel: true,
                incremental: true,
            },
            Self::Release => ProfileConfig {
                name: "release".to_string(),
                opt_level: OptLevel::O2,
                debug_info: false,
                parallel: true,
                incremental: false,
            },
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Effective compile policy of a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub name: String,
    pub opt_level: OptLevel,
    pub debug_info: bool,
    pub parallel: bool,
    pub incremental: bool,
}

impl ProfileConfig {
    /// Flags prepended to every C and GAS compile
    pub fn compile_flags(&self) -> Vec<String> {
        let mut flags = Vec::with_capacity(2);
        if self.debug_info {
            flags.push("-g".to_string());
        }
        flags.push(self.opt_level.flag().to_string());
        flags
    }

    /// Flags prepended to every NASM invocation
    pub fn nasm_flags(&self) -> Vec<String> {
        if self.debug_info {
            vec!["-g".to_string(), "-F".to_string(), "dwarf".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_profile_from_str() {
        assert_eq!(Profile::from_str("dev").unwrap(), Profile::Dev);
        assert_eq!(Profile::from_str("Release").unwrap(), Profile::Release);
        assert!(Profile::from_str("bench").is_err());
    }

    #[test]
    fn test_dev_profile_config() {
        let config = Profile::Dev.default_config();
        assert_eq!(config.opt_level, OptLevel::O2);
        assert!(config.debug_info);
        assert!(config.incremental);
        assert_eq!(config.compile_flags(), vec!["-g", "-O2"]);
        assert_eq!(config.nasm_flags(), vec!["-g", "-F", "dwarf"]);
    }

    #[test]
    fn test_release_profile_config() {
        let config = Profile::Release.default_config();
        assert!(!config.debug_info);
        assert!(!config.incremental); // Clean builds for release
        assert_eq!(config.compile_flags(), vec!["-O2"]);
        assert!(config.nasm_flags().is_empty());
    }

    #[rstest]
    #[case("0", OptLevel::O0)]
    #[case("O1", OptLevel::O1)]
    #[case("-O3", OptLevel::O3)]
    #[case("s", OptLevel::Os)]
    fn test_opt_level_parse(#[case] input: &str, #[case] expected: OptLevel) {
        assert_eq!(OptLevel::from_str(input).unwrap(), expected);
    }

    #[test]
    fn test_opt_level_rejects_garbage() {
        assert!(OptLevel::from_str("fast").is_err());
        assert!(OptLevel::from_str("4").is_err());
    }
}
