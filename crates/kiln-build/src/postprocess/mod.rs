//! Post-link stages
//!
//! Runs in a fixed order on the linked image: binary extraction, integrity
//! check, packaging, compression, backup. Extraction and packaging are fatal
//! on failure; the rest degrade to warnings.

pub mod backup;
pub mod compress;
pub mod extract;
pub mod integrity;
pub mod package;

use crate::config::BuildConfig;
use crate::log::{LogSink, Severity};
use crate::stage::{best_effort, Stage, StageFailure, StageOutcome, StageWarning};
use crate::toolchain::ToolRunner;
use chrono::Local;
use std::path::{Path, PathBuf};

/// What the post-link stages produced
#[derive(Debug, Clone, Default)]
pub struct PostprocessReport {
    pub binary: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub compressed: Option<PathBuf>,
    pub backup: Option<PathBuf>,
    pub outcomes: Vec<(Stage, StageOutcome)>,
    pub warnings: Vec<StageWarning>,
}

impl PostprocessReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, o)| o)
    }

    fn push(&mut self, stage: Stage, outcome: StageOutcome) {
        self.outcomes.push((stage, outcome));
    }
}

pub struct Postprocessor<'a> {
    config: &'a BuildConfig,
    runner: &'a dyn ToolRunner,
    sink: &'a dyn LogSink,
}

impl<'a> Postprocessor<'a> {
    pub fn new(config: &'a BuildConfig, runner: &'a dyn ToolRunner, sink: &'a dyn LogSink) -> Self {
        Self {
            config,
            runner,
            sink,
        }
    }

    pub fn run(&self, linked: &Path) -> Result<PostprocessReport, StageFailure> {
        let config = self.config;
        let pp = &config.postprocess;
        let mut report = PostprocessReport::default();

        // 1. Raw binary
        if pp.extract_binary {
            let outcome = extract::extract_binary(config, self.runner, self.sink, linked)
                .map_err(|e| StageFailure::new(Stage::ExtractBinary, e))?;
            report.binary = Some(config.raw_binary.clone());
            report.push(Stage::ExtractBinary, outcome);
        } else {
            report.push(Stage::ExtractBinary, StageOutcome::Disabled);
        }

        // 2. Integrity
        let outcome = if pp.integrity_check {
            match integrity::inspect(linked) {
                Ok(found) if found.is_clean() => {
                    self.sink.log(Severity::Success, "Integrity check passed");
                    StageOutcome::Completed
                }
                Ok(found) => StageOutcome::Warned(found.findings.join("; ")),
                Err(e) => best_effort(e),
            }
        } else {
            StageOutcome::Disabled
        };
        self.record(&mut report, Stage::Integrity, outcome);

        // 3. Packaging
        let Some(image) = &config.image else {
            report.push(Stage::Package, StageOutcome::Disabled);
            report.push(Stage::Compress, StageOutcome::Disabled);
            report.push(Stage::Backup, StageOutcome::Disabled);
            return Ok(report);
        };
        self.sink.log(Severity::Info, "Packaging bootable image");
        let packaged = package::Packager::new(config, image, self.runner, self.sink)
            .package(linked)
            .map_err(|e| StageFailure::new(Stage::Package, e))?;
        report.push(Stage::Package, StageOutcome::Completed);
        report.image = Some(packaged.clone());

        // 4. Compression
        let outcome = if pp.compress {
            match compress::compress_file(&packaged, pp.compression_level) {
                Ok(out) => {
                    self.sink.log(
                        Severity::Success,
                        &format!("Compressed {}", config.display_path(&out).display()),
                    );
                    report.compressed = Some(out);
                    StageOutcome::Completed
                }
                Err(e) => best_effort(e),
            }
        } else {
            StageOutcome::Disabled
        };
        self.record(&mut report, Stage::Compress, outcome);

        // 5. Backup
        let outcome = if pp.backup {
            match backup::backup_image(
                &packaged,
                &pp.backup_dir,
                &config.os_name,
                &config.os_version,
                Local::now(),
            ) {
                Ok(dest) => {
                    self.sink.log(
                        Severity::Success,
                        &format!("Saved {}", config.display_path(&dest).display()),
                    );
                    report.backup = Some(dest);
                    StageOutcome::Completed
                }
                Err(e) => best_effort(e),
            }
        } else {
            StageOutcome::Disabled
        };
        self.record(&mut report, Stage::Backup, outcome);

        Ok(report)
    }

    fn record(&self, report: &mut PostprocessReport, stage: Stage, outcome: StageOutcome) {
        match &outcome {
            StageOutcome::ToolMissing(message) | StageOutcome::Warned(message) => {
                self.sink
                    .log(Severity::Warning, &format!("{}: {}", stage, message));
                report.warnings.push(StageWarning {
                    stage,
                    message: message.clone(),
                });
            }
            _ => {}
        }
        report.push(stage, outcome);
    }
}
