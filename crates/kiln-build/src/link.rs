//! Link stage

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::log::{LogSink, Severity};
use crate::objects::ObjectSet;
use crate::state::LinkRecord;
use crate::toolchain::{link_invocation, run_checked, run_tool, Invocation, ToolRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Result of the link stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedImage {
    pub path: PathBuf,
    /// False when the existing image was reused
    pub relinked: bool,
    /// Non-fatal probe findings
    pub warnings: Vec<String>,
}

pub struct Linker<'a> {
    config: &'a BuildConfig,
    runner: &'a dyn ToolRunner,
    sink: &'a dyn LogSink,
    previous: Option<&'a LinkRecord>,
}

impl<'a> Linker<'a> {
    pub fn new(config: &'a BuildConfig, runner: &'a dyn ToolRunner, sink: &'a dyn LogSink) -> Self {
        Self {
            config,
            runner,
            sink,
            previous: None,
        }
    }

    /// Inputs of the last successful link, if known
    pub fn with_previous(mut self, previous: Option<&'a LinkRecord>) -> Self {
        self.previous = previous;
        self
    }

    /// Link `objects` in order against the configured linker script
    ///
    /// With `rebuilt == 0` in incremental mode, an image linked from the
    /// same inputs and flags and newer than every input is kept as is.
    pub fn link(&self, objects: &ObjectSet, rebuilt: usize) -> BuildResult<LinkedImage> {
        objects.verify()?;
        let output = &self.config.linked_image;

        if !self.config.linker_script.is_file() {
            return Err(BuildError::MissingInput {
                path: self.config.linker_script.clone(),
            });
        }
        if objects.is_empty() {
            return Err(BuildError::tool(
                &self.config.tools.ld,
                "no object files to link",
            ));
        }

        let inputs = objects.paths();
        if self.config.incremental()
            && rebuilt == 0
            && self.same_inputs(objects)
            && self.is_up_to_date(&inputs)
        {
            self.sink.log(
                Severity::Info,
                &format!("{} is up to date", self.config.display_path(output).display()),
            );
            let warnings = self.probe(output);
            return Ok(LinkedImage {
                path: output.clone(),
                relinked: false,
                warnings,
            });
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }

        self.sink.log(
            Severity::Info,
            &format!("Linking {} objects", inputs.len()),
        );
        let invocation = link_invocation(self.config, &inputs, output);
        self.sink.log(Severity::Debug, &invocation.command_line());
        run_checked(self.runner, &invocation)?;
        self.sink.log(
            Severity::Success,
            &format!("Linked {}", self.config.display_path(output).display()),
        );

        let warnings = self.probe(output);
        Ok(LinkedImage {
            path: output.clone(),
            relinked: true,
            warnings,
        })
    }

    fn same_inputs(&self, objects: &ObjectSet) -> bool {
        self.previous
            .is_some_and(|previous| *previous == LinkRecord::of(self.config, objects))
    }

    fn is_up_to_date(&self, inputs: &[PathBuf]) -> bool {
        let Some(image) = mtime(&self.config.linked_image) else {
            return false;
        };
        inputs
            .iter()
            .chain(std::iter::once(&self.config.linker_script))
            .all(|input| mtime(input).is_some_and(|t| t <= image))
    }

    /// Run the configured compatibility probe; every failure is a warning
    fn probe(&self, image: &Path) -> Vec<String> {
        let Some((program, args)) = self.config.link_probe.split_first() else {
            return Vec::new();
        };

        if !self.runner.is_available(program) {
            let warning = format!("compatibility probe skipped: tool not found: {}", program);
            self.sink.log(Severity::Warning, &warning);
            return vec![warning];
        }

        let invocation = Invocation::new(program, &self.config.project_root)
            .args(args.iter().cloned())
            .input(image);
        self.sink.log(Severity::Debug, &invocation.command_line());

        let warning = match run_tool(self.runner, &invocation) {
            Ok(out) if out.success() => {
                self.sink.log(Severity::Success, "Compatibility probe passed");
                return Vec::new();
            }
            Ok(out) => format!("compatibility probe failed: {}", out.diagnostic()),
            Err(e) => format!("compatibility probe failed: {}", e),
        };
        self.sink.log(Severity::Warning, &warning);
        vec![warning]
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
