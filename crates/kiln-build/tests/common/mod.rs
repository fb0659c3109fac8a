//! Shared helpers for pipeline tests
//!
//! `FakeToolchain` stands in for gcc/nasm/ld/objcopy/xorriso: it records
//! every invocation and writes deterministic artifacts, so whole pipeline
//! runs need no real toolchain.

#![allow(dead_code)]

use kiln_build::{BuildConfig, BuildOverrides, Invocation, ToolOutput, ToolRunner};
use kiln_config::KilnConfig;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub const BOOTSTRAP: &str = "src/arch/x86_64/boot.S";

/// Records invocations and fakes tool behavior
#[derive(Default)]
pub struct FakeToolchain {
    calls: Mutex<Vec<Invocation>>,
    /// Source file names that fail to compile
    failing: HashSet<String>,
    /// Programs that cannot be found
    missing: HashSet<String>,
    /// How long a failing compile takes before reporting
    fail_delay: Duration,
    /// How long a successful compile takes
    compile_delay: Duration,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    pub fn missing(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }

    pub fn with_fail_delay(mut self, delay: Duration) -> Self {
        self.fail_delay = delay;
        self
    }

    pub fn with_compile_delay(mut self, delay: Duration) -> Self {
        self.compile_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations of `program`
    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    /// Compiler and assembler invocations, by source file name
    pub fn compiled(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == "gcc" || c.program == "nasm")
            .filter_map(|c| c.inputs.first().cloned())
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }
}

impl ToolRunner for FakeToolchain {
    fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        if self.missing.contains(&invocation.program) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not found"));
        }

        let failing = invocation.inputs.iter().find(|p| {
            p.file_name()
                .is_some_and(|n| self.failing.contains(n.to_string_lossy().as_ref()))
        });
        if let Some(source) = failing {
            thread::sleep(self.fail_delay);
            return Ok(ToolOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("{}:3:1: error: expected ';' before '}}' token\n", source.display()),
            });
        }

        if invocation.program == "gcc" || invocation.program == "nasm" {
            thread::sleep(self.compile_delay);
        }

        if let Some(output) = &invocation.output {
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            let inputs: &[PathBuf] = if invocation.program == "ld" {
                // First input is the linker script
                &invocation.inputs[1..]
            } else {
                &invocation.inputs
            };
            let mut bytes = format!("{}:", invocation.program).into_bytes();
            for input in inputs.iter().filter(|p| p.is_file()) {
                bytes.extend(fs::read(input)?);
                bytes.push(b'|');
            }
            fs::write(output, bytes)?;
        }

        Ok(ToolOutput::default())
    }

    fn is_available(&self, program: &str) -> bool {
        !self.missing.contains(program)
    }
}

/// Scratch kernel project with a bootstrap unit, a linker script, a boot
/// config and the loader files packaging expects
pub struct TestProject {
    pub dir: TempDir,
    pub config: KilnConfig,
}

impl TestProject {
    /// Bootstrap plus the given kernel-relative sources
    pub fn new(sources: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = KilnConfig::default();
        config.compile.bootstrap = Some(BOOTSTRAP.into());

        let project = Self { dir, config };
        project.write_source(BOOTSTRAP, "_start: jmp kmain");
        for source in sources {
            project.write_source(source, &format!("/* {} */ int x;", source));
        }

        let root = project.root();
        write(&root.join("kernel/linker-scripts/x86_64.lds"), "ENTRY(_start)");
        write(&root.join("limine.conf"), "timeout: 3");
        for file in &project.config.image.loader_files {
            write(&root.join(&file.source), "limine");
        }
        project
    }

    /// Without the bootstrap unit
    pub fn without_bootstrap(sources: &[&str]) -> Self {
        let mut project = Self::new(sources);
        project.config.compile.bootstrap = None;
        fs::remove_file(project.kernel_path(BOOTSTRAP)).unwrap();
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn kernel_path(&self, rel: &str) -> PathBuf {
        self.root().join("kernel").join(rel)
    }

    pub fn write_source(&self, rel: &str, content: &str) {
        write(&self.kernel_path(rel), content);
    }

    /// Rewrite a source with new content and a modification time that is
    /// clearly newer than any object
    pub fn edit_source(&self, rel: &str, content: &str) {
        self.write_source(rel, content);
        set_mtime(&self.kernel_path(rel), SystemTime::now() + Duration::from_secs(10));
    }

    /// Bump modification time without changing content
    pub fn touch_source(&self, rel: &str) {
        set_mtime(&self.kernel_path(rel), SystemTime::now() + Duration::from_secs(10));
    }

    pub fn build_config(&self) -> BuildConfig {
        self.build_config_with(&BuildOverrides::default())
    }

    pub fn build_config_with(&self, overrides: &BuildOverrides) -> BuildConfig {
        BuildConfig::resolve(self.root(), &self.config, overrides).unwrap()
    }
}

pub fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}
