//! Project Configuration (kiln.toml)
//!
//! Handles project-level configuration stored in `kiln.toml` at the project root.
//! Every section and field carries a default that reproduces the stock x86_64
//! limine kernel layout, so an empty file is a valid configuration.

use crate::{ConfigError, ConfigResult, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KilnConfig {
    /// Schema version of the file
    pub schema_version: u32,

    /// OS metadata (name and version feed image names and the build ledger)
    pub os: OsSection,

    /// Directory layout
    pub paths: PathsSection,

    /// External tool locations
    pub toolchain: ToolchainSection,

    /// Compilation settings
    pub compile: CompileSection,

    /// Binary resources converted into linkable objects
    #[serde(rename = "embed", skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<EmbedEntry>,

    /// Link settings
    pub link: LinkSection,

    /// Post-link stage toggles
    pub postprocess: PostprocessSection,

    /// Bootable image packaging
    pub image: ImageSection,

    /// Scheduling and cache policy
    pub build: BuildSection,
}

/// OS metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OsSection {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub arch: String,
    pub bootloader: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// Directory layout. Paths are relative to the project root, except
/// `source_roots` which are relative to `kernel_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsSection {
    pub kernel_dir: PathBuf,
    pub source_roots: Vec<PathBuf>,
    pub obj_dir: PathBuf,
    pub bin_dir: PathBuf,
    /// File name of the linked kernel inside `bin_dir`
    pub output: String,
    pub linker_script: PathBuf,
    /// Holds the fingerprint cache and build history
    pub state_dir: PathBuf,
}

/// Tool locations. Unset fields fall back to the global config, then to
/// the stock GNU toolchain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ToolchainSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ld: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nasm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objcopy: Option<String>,
}

/// Compilation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompileSection {
    /// Recognized source extensions (without the dot)
    pub extensions: Vec<String>,
    /// Base file names never picked up by discovery
    pub exclude: Vec<String>,
    /// Architecture entry unit, relative to `kernel_dir`; linked first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<PathBuf>,
    /// C flags, without optimization or debug flags (those come from the profile)
    pub cflags: Vec<String>,
    /// Preprocessor flags shared by C and GAS units
    pub cppflags: Vec<String>,
    pub nasmflags: Vec<String>,
    /// Extra flags appended for the bootstrap unit
    pub bootstrap_flags: Vec<String>,
    /// Base arguments for converting embedded resources
    pub objcopy_args: Vec<String>,
    /// Per-path replacements of the C flags
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<FlagOverride>,
}

/// Replace the base C flags for C units whose path contains `contains`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlagOverride {
    pub contains: String,
    pub cflags: Vec<String>,
}

/// A binary file linked in as an object (fonts, splash images)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedEntry {
    /// Path relative to `kernel_dir`
    pub source: PathBuf,
    /// Extra objcopy arguments, e.g. `--redefine-sym`
    #[serde(default)]
    pub args: Vec<String>,
}

/// Link settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkSection {
    pub ldflags: Vec<String>,
    /// Boot-protocol probe command; the linked image path is appended. Empty disables it.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub probe: Vec<String>,
}

/// Post-link stage toggles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PostprocessSection {
    pub extract_binary: bool,
    pub integrity_check: bool,
    pub compress: bool,
    pub compression_level: u32,
    pub backup: bool,
    pub backup_dir: PathBuf,
}

/// Bootable image packaging
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageSection {
    pub enabled: bool,
    /// Staging directory for the image contents
    pub root: PathBuf,
    pub output: PathBuf,
    /// Boot-loader configuration fragment (project-relative)
    pub boot_config: PathBuf,
    /// Destination of the fragment inside the image root
    pub boot_config_dest: PathBuf,
    /// Destination of the kernel inside the image root
    pub kernel_dest: PathBuf,
    pub loader_files: Vec<LoaderFile>,
    pub builder: String,
    pub builder_args: Vec<String>,
    /// Post-build install command; the image path is appended. Empty disables it.
    pub install: Vec<String>,
}

/// A boot-loader file staged into the image root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderFile {
    pub source: PathBuf,
    /// Destination relative to the image root
    pub dest: PathBuf,
}

/// Scheduling and cache policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildSection {
    /// Profile name used when the CLI does not pick one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub incremental: bool,
    pub parallel: bool,
    /// Worker count; 0 means available hardware concurrency
    pub jobs: usize,
    /// Remove derived artifacts after a fatal failure
    pub clean_on_error: bool,
    /// Maximum number of runs kept in the history file
    pub history_limit: usize,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Freestanding x86_64 kernel flags without SSE
fn base_cflags() -> Vec<String> {
    strings(&[
        "-pipe",
        "-Wall",
        "-Wextra",
        "-std=gnu11",
        "-ffreestanding",
        "-fno-stack-protector",
        "-fno-stack-check",
        "-fno-lto",
        "-fno-PIC",
        "-ffunction-sections",
        "-fdata-sections",
        "-m64",
        "-march=x86-64",
        "-mabi=sysv",
        "-mno-80387",
        "-mno-mmx",
        "-mno-sse",
        "-mno-sse2",
        "-mno-red-zone",
        "-mcmodel=kernel",
    ])
}

/// Same as the base flags with SSE enabled, for vectorized code
fn simd_cflags() -> Vec<String> {
    base_cflags()
        .into_iter()
        .map(|flag| match flag.as_str() {
            "-mno-sse" => "-msse".to_string(),
            "-mno-sse2" => "-msse2".to_string(),
            _ => flag,
        })
        .collect()
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            os: OsSection::default(),
            paths: PathsSection::default(),
            toolchain: ToolchainSection::default(),
            compile: CompileSection::default(),
            embeds: Vec::new(),
            link: LinkSection::default(),
            postprocess: PostprocessSection::default(),
            image: ImageSection::default(),
            build: BuildSection::default(),
        }
    }
}

impl Default for OsSection {
    fn default() -> Self {
        Self {
            name: "DEER".to_string(),
            version: "v0.0.1".to_string(),
            description: None,
            author: None,
            arch: "x86_64".to_string(),
            bootloader: "limine".to_string(),
            license: None,
        }
    }
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            kernel_dir: PathBuf::from("kernel"),
            source_roots: vec![PathBuf::from("src")],
            obj_dir: PathBuf::from("kernel/obj-x86_64"),
            bin_dir: PathBuf::from("kernel/bin-x86_64"),
            output: "kernel".to_string(),
            linker_script: PathBuf::from("kernel/linker-scripts/x86_64.lds"),
            state_dir: PathBuf::from(".kiln"),
        }
    }
}

impl Default for CompileSection {
    fn default() -> Self {
        Self {
            extensions: strings(&["c", "S", "asm"]),
            exclude: Vec::new(),
            bootstrap: None,
            cflags: base_cflags(),
            cppflags: strings(&[
                "-Ikernel/src",
                "-Ilimine-tools/limine-protocol/include",
                "-isystemlimine-tools/freestnd-c-hdrs/include",
                "-nostdinc",
                "-DLIMINE_API_REVISION=3",
                "-MMD",
                "-MP",
            ]),
            nasmflags: strings(&["-Wall", "-f", "elf64"]),
            bootstrap_flags: Vec::new(),
            objcopy_args: strings(&["-I", "binary", "-O", "elf64-x86-64", "-B", "i386"]),
            overrides: vec![
                FlagOverride {
                    contains: "simd".to_string(),
                    cflags: simd_cflags(),
                },
                FlagOverride {
                    contains: "kernel.c".to_string(),
                    cflags: simd_cflags(),
                },
            ],
        }
    }
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            ldflags: strings(&[
                "-nostdlib",
                "-static",
                "-z",
                "max-page-size=0x1000",
                "--gc-sections",
            ]),
            probe: Vec::new(),
        }
    }
}

impl Default for PostprocessSection {
    fn default() -> Self {
        Self {
            extract_binary: true,
            integrity_check: true,
            compress: false,
            compression_level: 6,
            backup: false,
            backup_dir: PathBuf::from("demo_iso"),
        }
    }
}

impl Default for ImageSection {
    fn default() -> Self {
        let limine = Path::new("limine-tools/limine");
        let loader = |file: &str, dest: &str| LoaderFile {
            source: limine.join(file),
            dest: Path::new(dest).join(file),
        };

        Self {
            enabled: true,
            root: PathBuf::from("iso_root"),
            output: PathBuf::from("deer.iso"),
            boot_config: PathBuf::from("limine.conf"),
            boot_config_dest: PathBuf::from("boot/limine/limine.conf"),
            kernel_dest: PathBuf::from("boot/kernel"),
            loader_files: vec![
                loader("limine-bios.sys", "boot/limine"),
                loader("limine-bios-cd.bin", "boot/limine"),
                loader("limine-uefi-cd.bin", "boot/limine"),
                loader("BOOTX64.EFI", "EFI/BOOT"),
                loader("BOOTIA32.EFI", "EFI/BOOT"),
            ],
            builder: "xorriso".to_string(),
            builder_args: strings(&[
                "-as",
                "mkisofs",
                "-R",
                "-r",
                "-J",
                "-b",
                "boot/limine/limine-bios-cd.bin",
                "-no-emul-boot",
                "-boot-load-size",
                "4",
                "-boot-info-table",
                "-hfsplus",
                "-apm-block-size",
                "2048",
                "--efi-boot",
                "boot/limine/limine-uefi-cd.bin",
                "-efi-boot-part",
                "--efi-boot-image",
                "--protective-msdos-label",
            ]),
            install: strings(&["limine-tools/limine/limine", "bios-install"]),
        }
    }
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            profile: None,
            incremental: true,
            parallel: true,
            jobs: 0,
            clean_on_error: false,
            history_limit: 50,
        }
    }
}

impl ToolchainSection {
    pub fn cc(&self) -> &str {
        self.cc.as_deref().unwrap_or("gcc")
    }

    pub fn ld(&self) -> &str {
        self.ld.as_deref().unwrap_or("ld")
    }

    pub fn nasm(&self) -> &str {
        self.nasm.as_deref().unwrap_or("nasm")
    }

    pub fn objcopy(&self) -> &str {
        self.objcopy.as_deref().unwrap_or("objcopy")
    }

    /// Fill unset tools from `fallback`; explicit values in `self` win
    pub fn merge_under(&mut self, fallback: &ToolchainSection) {
        if self.cc.is_none() {
            self.cc = fallback.cc.clone();
        }
        if self.ld.is_none() {
            self.ld = fallback.ld.clone();
        }
        if self.nasm.is_none() {
            self.nasm = fallback.nasm.clone();
        }
        if self.objcopy.is_none() {
            self.objcopy = fallback.objcopy.clone();
        }
    }
}

impl KilnConfig {
    /// Load project configuration from a file
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

    /// Write the configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Serialize to pretty TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The file `kiln init` writes
    pub fn default_toml() -> ConfigResult<String> {
        Self::default().to_toml()
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.schema_version > SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedSchema {
                found: self.schema_version,
                supported: SCHEMA_VERSION,
            });
        }

        if self.os.name.trim().is_empty() {
            return Err(invalid("os.name", "name cannot be empty"));
        }

        let tools = [
            ("toolchain.cc", &self.toolchain.cc),
            ("toolchain.ld", &self.toolchain.ld),
            ("toolchain.nasm", &self.toolchain.nasm),
            ("toolchain.objcopy", &self.toolchain.objcopy),
        ];
        for (field, value) in tools {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(invalid(field, "tool path cannot be empty"));
            }
        }

        if self.compile.extensions.is_empty() {
            return Err(invalid(
                "compile.extensions",
                "at least one source extension is required",
            ));
        }
        if let Some(ext) = self.compile.extensions.iter().find(|e| e.starts_with('.')) {
            return Err(invalid(
                "compile.extensions",
                &format!("'{}' must not include the leading dot", ext),
            ));
        }

        if self.paths.source_roots.is_empty() {
            return Err(invalid(
                "paths.source_roots",
                "at least one source root is required",
            ));
        }
        if self.paths.output.trim().is_empty() {
            return Err(invalid("paths.output", "output name cannot be empty"));
        }

        if self.postprocess.compression_level > 9 {
            return Err(invalid(
                "postprocess.compression_level",
                &format!("{} is out of range 0-9", self.postprocess.compression_level),
            ));
        }

        if self.image.enabled && self.image.builder.trim().is_empty() {
            return Err(invalid("image.builder", "builder cannot be empty"));
        }

        if self.build.history_limit == 0 {
            return Err(invalid("build.history_limit", "must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
