//! Persisted record of what the last run built with
//!
//! Object freshness is decided per unit from content and mtime, which says
//! nothing about the flags an object was compiled with or the inputs the
//! image was linked from. This file keeps both so the next run can tell.

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::fingerprint::{write_atomic, Fingerprint};
use crate::objects::ObjectSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Inputs of the last successful link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Digest of linker, ldflags and script path
    pub signature: String,
    /// Object paths relative to the project root, in link order
    pub inputs: Vec<String>,
}

impl LinkRecord {
    /// Record for linking `objects` under `config`
    pub fn of(config: &BuildConfig, objects: &ObjectSet) -> Self {
        Self {
            signature: link_signature(config).to_hex(),
            inputs: objects
                .paths()
                .iter()
                .map(|p| {
                    config
                        .display_path(p)
                        .to_string_lossy()
                        .replace('\\', "/")
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
    /// Digest of every flag that shapes an object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkRecord>,
}

impl BuildState {
    /// Load the state; a missing file is an empty state
    pub fn load(path: &Path) -> BuildResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(BuildError::cache_io(path, e)),
        };
        serde_json::from_str(&content).map_err(|e| BuildError::CacheFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> BuildResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| BuildError::CacheFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        write_atomic(path, json.as_bytes())
    }

    /// True when objects on disk were built with other flags than `signature`
    ///
    /// An unknown previous signature is not a mismatch.
    pub fn flags_changed(&self, signature: &str) -> bool {
        self.compile_signature
            .as_deref()
            .is_some_and(|previous| previous != signature)
    }
}

/// Digest of the tools and flags every compile invocation is built from
pub fn compile_signature(config: &BuildConfig) -> Fingerprint {
    let tools = &config.tools;
    let flags = &config.flags;
    let mut parts: Vec<String> = vec![
        tools.cc.clone(),
        tools.nasm.clone(),
        tools.objcopy.clone(),
    ];
    let mut group = |name: &str, values: &[String]| {
        parts.push(format!("[{}]", name));
        parts.extend(values.iter().cloned());
    };
    group("cflags", &flags.cflags);
    group("cppflags", &flags.cppflags);
    group("nasmflags", &flags.nasmflags);
    group("bootstrap", &flags.bootstrap_flags);
    group("objcopy", &flags.objcopy_args);
    group("profile", &config.profile.compile_flags());
    group("profile-nasm", &config.profile.nasm_flags());
    for o in &flags.overrides {
        group(&format!("override:{}", o.pattern), &o.cflags);
    }
    for embed in &config.embeds {
        group(
            &format!("embed:{}", config.display_path(&embed.source).display()),
            &embed.args,
        );
    }
    digest(&parts)
}

/// Digest of what a link depends on besides its objects
pub fn link_signature(config: &BuildConfig) -> Fingerprint {
    let mut parts = vec![
        config.tools.ld.clone(),
        config.display_path(&config.linker_script).display().to_string(),
        "[ldflags]".to_string(),
    ];
    parts.extend(config.flags.ldflags.iter().cloned());
    digest(&parts)
}

fn digest(parts: &[String]) -> Fingerprint {
    Fingerprint::of_bytes(parts.join("\0").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOverrides;
    use crate::profile::{OptLevel, Profile};
    use kiln_config::KilnConfig;
    use tempfile::TempDir;

    fn resolve(project: &KilnConfig, overrides: &BuildOverrides) -> BuildConfig {
        BuildConfig::resolve(Path::new("/work/deer"), project, overrides).unwrap()
    }

    #[test]
    fn test_signature_tracks_profile_flags() {
        let project = KilnConfig::default();
        let dev = compile_signature(&resolve(&project, &BuildOverrides::default()));
        let release = compile_signature(&resolve(
            &project,
            &BuildOverrides {
                profile: Some(Profile::Release),
                ..Default::default()
            },
        ));
        let o3 = compile_signature(&resolve(
            &project,
            &BuildOverrides {
                opt_level: Some(OptLevel::O3),
                ..Default::default()
            },
        ));
        assert_ne!(dev, release);
        assert_ne!(dev, o3);
        assert_eq!(
            dev,
            compile_signature(&resolve(&project, &BuildOverrides::default()))
        );
    }

    #[test]
    fn test_signature_tracks_project_cflags() {
        let mut project = KilnConfig::default();
        let before = compile_signature(&resolve(&project, &BuildOverrides::default()));
        project.compile.cflags.push("-Wall".to_string());
        let after = compile_signature(&resolve(&project, &BuildOverrides::default()));
        assert_ne!(before, after);
    }

    #[test]
    fn test_parallelism_does_not_change_signature() {
        let project = KilnConfig::default();
        let serial = resolve(
            &project,
            &BuildOverrides {
                parallel: Some(false),
                ..Default::default()
            },
        );
        let parallel = resolve(&project, &BuildOverrides::default());
        assert_eq!(compile_signature(&serial), compile_signature(&parallel));
    }

    #[test]
    fn test_link_signature_tracks_ldflags() {
        let mut project = KilnConfig::default();
        let before = link_signature(&resolve(&project, &BuildOverrides::default()));
        project.link.ldflags.push("--gc-sections".to_string());
        let after = link_signature(&resolve(&project, &BuildOverrides::default()));
        assert_ne!(before, after);
    }

    #[test]
    fn test_flags_changed() {
        let mut state = BuildState::default();
        assert!(!state.flags_changed("abc"));
        state.compile_signature = Some("abc".to_string());
        assert!(!state.flags_changed("abc"));
        assert!(state.flags_changed("def"));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/build-state.json");
        assert_eq!(BuildState::load(&path).unwrap(), BuildState::default());

        let state = BuildState {
            compile_signature: Some("abc".to_string()),
            link: Some(LinkRecord {
                signature: "def".to_string(),
                inputs: vec!["kernel/obj/boot.S.o".to_string()],
            }),
        };
        state.save(&path).unwrap();
        assert_eq!(BuildState::load(&path).unwrap(), state);
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("build-state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            BuildState::load(&path),
            Err(BuildError::CacheFormat { .. })
        ));
    }
}
