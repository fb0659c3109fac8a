//! Resolved, immutable build configuration
//!
//! `BuildConfig` is what every pipeline component receives at construction:
//! absolute paths, effective flags and toggles. It is produced once from the
//! loaded `KilnConfig`, the selected profile and CLI overrides.

use crate::error::{BuildError, BuildResult};
use crate::profile::{OptLevel, Profile, ProfileConfig};
use kiln_config::KilnConfig;
use std::path::{Path, PathBuf};

/// CLI-level overrides applied on top of the profile and project config
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub profile: Option<Profile>,
    pub debug_info: Option<bool>,
    pub opt_level: Option<OptLevel>,
    pub parallel: Option<bool>,
    pub jobs: Option<usize>,
    pub incremental: Option<bool>,
    pub compress: Option<bool>,
    pub backup: Option<bool>,
}

/// Tool programs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub cc: String,
    pub ld: String,
    pub nasm: String,
    pub objcopy: String,
}

/// C flag replacement for matching paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagOverride {
    /// Lowercased substring matched against the kernel-relative path
    pub pattern: String,
    pub cflags: Vec<String>,
}

/// Flags for every invocation kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFlags {
    pub cflags: Vec<String>,
    pub cppflags: Vec<String>,
    pub nasmflags: Vec<String>,
    pub bootstrap_flags: Vec<String>,
    pub objcopy_args: Vec<String>,
    pub overrides: Vec<FlagOverride>,
    pub ldflags: Vec<String>,
}

/// Embedded resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedConfig {
    pub source: PathBuf,
    pub args: Vec<String>,
}

/// Post-link stage toggles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostprocessConfig {
    pub extract_binary: bool,
    pub integrity_check: bool,
    pub compress: bool,
    pub compression_level: u32,
    pub backup: bool,
    pub backup_dir: PathBuf,
}

/// Image packaging; absent when packaging is disabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    pub root: PathBuf,
    pub output: PathBuf,
    pub boot_config: PathBuf,
    pub boot_config_dest: PathBuf,
    pub kernel_dest: PathBuf,
    /// (source, destination inside root)
    pub loader_files: Vec<(PathBuf, PathBuf)>,
    pub builder: String,
    pub builder_args: Vec<String>,
    pub install: Vec<String>,
}

/// Fully resolved configuration for one build run
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub project_root: PathBuf,
    pub os_name: String,
    pub os_version: String,

    pub kernel_dir: PathBuf,
    pub source_roots: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
    pub bootstrap: Option<PathBuf>,
    pub embeds: Vec<EmbedConfig>,

    pub obj_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub linked_image: PathBuf,
    pub raw_binary: PathBuf,
    pub linker_script: PathBuf,
    pub state_dir: PathBuf,

    pub tools: ToolPaths,
    pub flags: CompileFlags,
    pub profile: ProfileConfig,
    /// Worker count, already resolved (1 when parallelism is off)
    pub jobs: usize,
    pub link_probe: Vec<String>,

    pub postprocess: PostprocessConfig,
    pub image: Option<ImageConfig>,

    pub clean_on_error: bool,
    pub history_limit: usize,
}

impl BuildConfig {
    /// Resolve a loaded project config against its root directory
    pub fn resolve(
        project_root: &Path,
        config: &KilnConfig,
        overrides: &BuildOverrides,
    ) -> BuildResult<Self> {
        config
            .validate()
            .map_err(|e| BuildError::Config(e.to_string()))?;

        let root = project_root.to_path_buf();
        let abs = |p: &Path| root.join(p);
        let kernel_dir = abs(&config.paths.kernel_dir);

        let profile_name = match (overrides.profile, &config.build.profile) {
            (Some(profile), _) => profile,
            (None, Some(name)) => Profile::from_str(name)?,
            (None, None) => Profile::Dev,
        };
        let mut profile = profile_name.default_config();
        // The project file refines the dev profile only; release stays clean.
        if profile_name == Profile::Dev {
            profile.incremental = config.build.incremental;
        }
        profile.parallel = config.build.parallel;
        if let Some(debug) = overrides.debug_info {
            profile.debug_info = debug;
        }
        if let Some(level) = overrides.opt_level {
            profile.opt_level = level;
        }
        if let Some(parallel) = overrides.parallel {
            profile.parallel = parallel;
        }
        if let Some(incremental) = overrides.incremental {
            profile.incremental = incremental;
        }

        let jobs = if profile.parallel {
            match overrides.jobs.unwrap_or(config.build.jobs) {
                0 => default_jobs(),
                n => n,
            }
        } else {
            1
        };

        let bin_dir = abs(&config.paths.bin_dir);
        let linked_image = bin_dir.join(&config.paths.output);
        let raw_binary = bin_dir.join(format!("{}.bin", config.paths.output));

        let image = config.image.enabled.then(|| ImageConfig {
            root: abs(&config.image.root),
            output: abs(&config.image.output),
            boot_config: abs(&config.image.boot_config),
            boot_config_dest: config.image.boot_config_dest.clone(),
            kernel_dest: config.image.kernel_dest.clone(),
            loader_files: config
                .image
                .loader_files
                .iter()
                .map(|f| (abs(&f.source), f.dest.clone()))
                .collect(),
            builder: config.image.builder.clone(),
            builder_args: config.image.builder_args.clone(),
            install: config.image.install.clone(),
        });

        let pp = &config.postprocess;
        let postprocess = PostprocessConfig {
            extract_binary: pp.extract_binary,
            integrity_check: pp.integrity_check,
            compress: overrides.compress.unwrap_or(pp.compress),
            compression_level: pp.compression_level,
            backup: overrides.backup.unwrap_or(pp.backup),
            backup_dir: abs(&pp.backup_dir),
        };

        let compile = &config.compile;
        let flags = CompileFlags {
            cflags: compile.cflags.clone(),
            cppflags: compile.cppflags.clone(),
            nasmflags: compile.nasmflags.clone(),
            bootstrap_flags: compile.bootstrap_flags.clone(),
            objcopy_args: compile.objcopy_args.clone(),
            overrides: compile
                .overrides
                .iter()
                .map(|o| FlagOverride {
                    pattern: o.contains.to_lowercase(),
                    cflags: o.cflags.clone(),
                })
                .collect(),
            ldflags: config.link.ldflags.clone(),
        };

        Ok(Self {
            os_name: config.os.name.clone(),
            os_version: config.os.version.clone(),
            source_roots: config
                .paths
                .source_roots
                .iter()
                .map(|r| kernel_dir.join(r))
                .collect(),
            extensions: compile.extensions.clone(),
            exclude: compile.exclude.clone(),
            bootstrap: compile.bootstrap.as_ref().map(|b| kernel_dir.join(b)),
            embeds: config
                .embeds
                .iter()
                .map(|e| EmbedConfig {
                    source: kernel_dir.join(&e.source),
                    args: e.args.clone(),
                })
                .collect(),
            obj_dir: abs(&config.paths.obj_dir),
            bin_dir,
            linked_image,
            raw_binary,
            linker_script: abs(&config.paths.linker_script),
            state_dir: abs(&config.paths.state_dir),
            tools: ToolPaths {
                cc: config.toolchain.cc().to_string(),
                ld: config.toolchain.ld().to_string(),
                nasm: config.toolchain.nasm().to_string(),
                objcopy: config.toolchain.objcopy().to_string(),
            },
            flags,
            profile,
            jobs,
            link_probe: config.link.probe.clone(),
            postprocess,
            image,
            clean_on_error: config.build.clean_on_error,
            history_limit: config.build.history_limit,
            kernel_dir,
            project_root: root,
        })
    }

    /// Persisted path -> digest map
    pub fn fingerprint_file(&self) -> PathBuf {
        self.state_dir.join("fingerprints.json")
    }

    /// Persisted run history
    pub fn history_file(&self) -> PathBuf {
        self.state_dir.join("history.json")
    }

    /// Compile signature and last link inputs
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("build-state.json")
    }

    /// Whether incremental mode is on for this run
    pub fn incremental(&self) -> bool {
        self.profile.incremental
    }

    /// Path relative to the project root when possible, for messages and cache keys
    pub fn display_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.project_root).unwrap_or(path)
    }
}

/// Available hardware concurrency, at least 1
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolve(config: &KilnConfig, overrides: &BuildOverrides) -> BuildConfig {
        BuildConfig::resolve(Path::new("/work/deer"), config, overrides).unwrap()
    }

    #[test]
    fn test_paths_are_absolute() {
        let config = resolve(&KilnConfig::default(), &BuildOverrides::default());
        assert_eq!(config.kernel_dir, Path::new("/work/deer/kernel"));
        assert_eq!(config.source_roots, vec![PathBuf::from("/work/deer/kernel/src")]);
        assert_eq!(
            config.linked_image,
            Path::new("/work/deer/kernel/bin-x86_64/kernel")
        );
        assert_eq!(
            config.raw_binary,
            Path::new("/work/deer/kernel/bin-x86_64/kernel.bin")
        );
        assert_eq!(
            config.fingerprint_file(),
            Path::new("/work/deer/.kiln/fingerprints.json")
        );
        assert_eq!(
            config.state_file(),
            Path::new("/work/deer/.kiln/build-state.json")
        );
    }

    #[test]
    fn test_parallel_off_forces_one_job() {
        let overrides = BuildOverrides {
            parallel: Some(false),
            jobs: Some(8),
            ..Default::default()
        };
        let config = resolve(&KilnConfig::default(), &overrides);
        assert_eq!(config.jobs, 1);
    }

    #[test]
    fn test_explicit_jobs() {
        let overrides = BuildOverrides {
            jobs: Some(3),
            ..Default::default()
        };
        assert_eq!(resolve(&KilnConfig::default(), &overrides).jobs, 3);
    }

    #[test]
    fn test_zero_jobs_means_hardware_concurrency() {
        let config = resolve(&KilnConfig::default(), &BuildOverrides::default());
        assert_eq!(config.jobs, default_jobs());
        assert!(config.jobs >= 1);
    }

    #[test]
    fn test_release_profile_disables_incremental() {
        let overrides = BuildOverrides {
            profile: Some(Profile::Release),
            ..Default::default()
        };
        let config = resolve(&KilnConfig::default(), &overrides);
        assert!(!config.incremental());
        assert!(!config.profile.debug_info);
    }

    #[test]
    fn test_overrides_beat_project_config() {
        let mut project = KilnConfig::default();
        project.postprocess.compress = false;
        project.build.incremental = true;

        let overrides = BuildOverrides {
            compress: Some(true),
            incremental: Some(false),
            debug_info: Some(false),
            opt_level: Some(OptLevel::Os),
            ..Default::default()
        };
        let config = resolve(&project, &overrides);
        assert!(config.postprocess.compress);
        assert!(!config.incremental());
        assert_eq!(config.profile.compile_flags(), vec!["-Os"]);
    }

    #[test]
    fn test_image_disabled() {
        let mut project = KilnConfig::default();
        project.image.enabled = false;
        assert!(resolve(&project, &BuildOverrides::default()).image.is_none());
    }

    #[test]
    fn test_bootstrap_is_kernel_relative() {
        let mut project = KilnConfig::default();
        project.compile.bootstrap = Some("src/arch/x86_64/boot.S".into());
        let config = resolve(&project, &BuildOverrides::default());
        assert_eq!(
            config.bootstrap,
            Some(PathBuf::from("/work/deer/kernel/src/arch/x86_64/boot.S"))
        );
    }
}
