//! Bootable image assembly
//!
//! Stages the kernel, boot-loader config and loader files into the image
//! root, runs the image builder, then the optional install step.

use crate::config::{BuildConfig, ImageConfig};
use crate::error::{BuildError, BuildResult};
use crate::log::{LogSink, Severity};
use crate::toolchain::{run_checked, Invocation, ToolRunner};
use std::fs;
use std::path::{Path, PathBuf};

pub struct Packager<'a> {
    config: &'a BuildConfig,
    image: &'a ImageConfig,
    runner: &'a dyn ToolRunner,
    sink: &'a dyn LogSink,
}

impl<'a> Packager<'a> {
    pub fn new(
        config: &'a BuildConfig,
        image: &'a ImageConfig,
        runner: &'a dyn ToolRunner,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self {
            config,
            image,
            runner,
            sink,
        }
    }

    /// Stage and build; returns the packaged image path
    pub fn package(&self, kernel: &Path) -> BuildResult<PathBuf> {
        self.stage(kernel)?;
        self.build()?;
        self.install()?;
        self.sink.log(
            Severity::Success,
            &format!(
                "Image created: {}",
                self.config.display_path(&self.image.output).display()
            ),
        );
        Ok(self.image.output.clone())
    }

    /// Populate the image root
    ///
    /// The kernel and loader files are always refreshed. The boot-loader
    /// config is copied only when absent so edits made in the root survive.
    pub fn stage(&self, kernel: &Path) -> BuildResult<()> {
        let root = &self.image.root;
        copy_into(kernel, &root.join(&self.image.kernel_dest))?;

        let boot_config = root.join(&self.image.boot_config_dest);
        if !boot_config.exists() {
            copy_into(&self.image.boot_config, &boot_config)?;
        }

        for (source, dest) in &self.image.loader_files {
            copy_into(source, &root.join(dest))?;
        }
        self.sink.log(
            Severity::Debug,
            &format!("Staged image root {}", root.display()),
        );
        Ok(())
    }

    fn build(&self) -> BuildResult<()> {
        if let Some(parent) = self.image.output.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        let invocation = Invocation::new(&self.image.builder, &self.config.project_root)
            .args(self.image.builder_args.iter().cloned())
            .input(&self.image.root)
            .arg("-o")
            .arg(self.image.output.display().to_string())
            .with_output(&self.image.output);
        self.run(invocation)
    }

    fn install(&self) -> BuildResult<()> {
        let Some((program, args)) = self.image.install.split_first() else {
            return Ok(());
        };
        let program = resolve_program(&self.config.project_root, program);
        let invocation = Invocation::new(program, &self.config.project_root)
            .args(args.iter().cloned())
            .input(&self.image.output);
        self.run(invocation)
    }

    fn run(&self, invocation: Invocation) -> BuildResult<()> {
        self.sink.log(Severity::Debug, &invocation.command_line());
        run_checked(self.runner, &invocation)?;
        Ok(())
    }
}

/// Programs given as relative paths (`limine-tools/limine/limine`) resolve
/// against the project root; bare names are left to `PATH`
fn resolve_program(root: &Path, program: &str) -> String {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        root.join(path).display().to_string()
    } else {
        program.to_string()
    }
}

fn copy_into(source: &Path, dest: &Path) -> BuildResult<()> {
    if !source.is_file() {
        return Err(BuildError::MissingInput {
            path: source.to_path_buf(),
        });
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::copy(source, dest).map_err(|e| BuildError::io(dest, e))?;
    Ok(())
}
