//! Build orchestration
//!
//! Discover, compile, link, post-process, record. Every stage after
//! discovery receives the previous stage's output explicitly; the only state
//! shared across runs is the fingerprint store, the build state and the
//! ledger on disk.

use crate::clean;
use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::fingerprint::FingerprintStore;
use crate::ledger::{BuildLedger, BuildStats, RunRecord};
use crate::link::{LinkedImage, Linker};
use crate::log::{LogSink, NullSink, Severity};
use crate::objects::ObjectSet;
use crate::postprocess::{PostprocessReport, Postprocessor};
use crate::scheduler::CompileScheduler;
use crate::source::SourceDiscoverer;
use crate::stage::{Stage, StageFailure, StageWarning};
use crate::state::{compile_signature, BuildState, LinkRecord};
use crate::toolchain::{ProcessRunner, ToolRunner};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub stats: BuildStats,
    pub objects: ObjectSet,
    pub linked_image: PathBuf,
    /// False when the link was skipped as up to date
    pub relinked: bool,
    pub postprocess: PostprocessReport,
    /// Every non-fatal problem, across all stages
    pub warnings: Vec<StageWarning>,
}

/// A run that stopped at a fatal stage
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: BuildError,
    pub stats: BuildStats,
    /// Artifacts removed by clean-on-error
    pub cleaned: Vec<PathBuf>,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type PipelineResult = Result<BuildReport, PipelineFailure>;

struct Built {
    objects: ObjectSet,
    linked: LinkedImage,
    postprocess: PostprocessReport,
}

/// Build pipeline
pub struct Pipeline {
    config: BuildConfig,
    runner: Arc<dyn ToolRunner>,
    sink: Arc<dyn LogSink>,
}

impl Pipeline {
    /// Pipeline running real processes and logging nowhere
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            runner: Arc::new(ProcessRunner),
            sink: Arc::new(NullSink),
        }
    }

    /// Use a different tool runner
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Send log messages to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run every stage
    pub fn run(&self) -> PipelineResult {
        let config = &self.config;
        let mut stats = BuildStats::start();
        self.log(
            Severity::Info,
            format!(
                "Building {} {} ({} profile, {} job{})",
                config.os_name,
                config.os_version,
                config.profile.name,
                config.jobs,
                if config.jobs == 1 { "" } else { "s" }
            ),
        );

        let mut store = self.load_fingerprints();
        let mut state = self.load_state();
        let result = self.execute(&mut store, &mut state, &mut stats);

        // Persisted even after a failure so finished compiles are not redone
        if let Err(e) = store.persist() {
            self.log(
                Severity::Warning,
                format!("could not save fingerprint cache: {}", e),
            );
        }
        if let Err(e) = state.save(&config.state_file()) {
            self.log(
                Severity::Warning,
                format!("could not save build state: {}", e),
            );
        }
        stats.finish();

        match result {
            Ok(built) => {
                self.record(RunRecord::new(&stats, true, &config.os_version));
                let mut warnings: Vec<StageWarning> = built
                    .linked
                    .warnings
                    .iter()
                    .map(|message| StageWarning {
                        stage: Stage::Link,
                        message: message.clone(),
                    })
                    .collect();
                warnings.extend(built.postprocess.warnings.iter().cloned());
                self.log(
                    Severity::Success,
                    format!(
                        "Build finished in {:.2}s: {} compiled, {} cached",
                        stats.elapsed().as_secs_f64(),
                        stats.compiled,
                        stats.cache_hits
                    ),
                );
                Ok(BuildReport {
                    stats,
                    objects: built.objects,
                    linked_image: built.linked.path,
                    relinked: built.linked.relinked,
                    postprocess: built.postprocess,
                    warnings,
                })
            }
            Err(failure) => {
                self.log(
                    Severity::Error,
                    format!("{} stage failed: {}", failure.stage, failure.error),
                );
                self.record(
                    RunRecord::new(&stats, false, &config.os_version)
                        .with_failed_stage(failure.stage.name()),
                );
                let cleaned = if config.clean_on_error {
                    self.clean_after_error()
                } else {
                    Vec::new()
                };
                Err(PipelineFailure {
                    stage: failure.stage,
                    error: failure.error,
                    stats,
                    cleaned,
                })
            }
        }
    }

    fn execute(
        &self,
        store: &mut FingerprintStore,
        state: &mut BuildState,
        stats: &mut BuildStats,
    ) -> Result<Built, StageFailure> {
        let signature = compile_signature(&self.config).to_hex();
        let flags_changed = state.flags_changed(&signature);
        let rebuild_all;
        let config = if flags_changed && self.config.incremental() {
            self.log(
                Severity::Info,
                "Compile flags changed since the last build, rebuilding everything".to_string(),
            );
            let mut forced = self.config.clone();
            forced.profile.incremental = false;
            rebuild_all = forced;
            &rebuild_all
        } else {
            &self.config
        };
        let runner = self.runner.as_ref();
        let sink = self.sink.as_ref();

        let units = SourceDiscoverer::new(config)
            .discover()
            .map_err(|e| StageFailure::new(Stage::Discover, e))?;
        if units.is_empty() {
            return Err(StageFailure::new(
                Stage::Discover,
                BuildError::Config(format!(
                    "no source files found under {}",
                    config.display_path(&config.kernel_dir).display()
                )),
            ));
        }
        self.log(Severity::Debug, format!("Discovered {} units", units.len()));

        // Existing objects already match these flags unless they changed;
        // otherwise the signature moves only once every unit is rebuilt.
        if !flags_changed {
            state.compile_signature = Some(signature.clone());
        }
        let objects = CompileScheduler::new(config, self.runner.clone(), self.sink.clone())
            .schedule(&units, store, stats)
            .map_err(|e| StageFailure::new(Stage::Compile, e))?;
        state.compile_signature = Some(signature);

        let previous = state.link.take();
        let linked = Linker::new(config, runner, sink)
            .with_previous(previous.as_ref())
            .link(&objects, stats.compiled)
            .map_err(|e| StageFailure::new(Stage::Link, e))?;
        state.link = Some(LinkRecord::of(config, &objects));

        let postprocess = Postprocessor::new(config, runner, sink).run(&linked.path)?;

        Ok(Built {
            objects,
            linked,
            postprocess,
        })
    }

    fn load_fingerprints(&self) -> FingerprintStore {
        let path = self.config.fingerprint_file();
        let root = &self.config.project_root;
        FingerprintStore::load(&path, root).unwrap_or_else(|e| {
            self.log(
                Severity::Warning,
                format!("fingerprint cache unreadable, starting cold: {}", e),
            );
            FingerprintStore::empty(&path, root)
        })
    }

    fn load_state(&self) -> BuildState {
        BuildState::load(&self.config.state_file()).unwrap_or_else(|e| {
            self.log(
                Severity::Warning,
                format!("build state unreadable, relinking: {}", e),
            );
            BuildState::default()
        })
    }

    fn load_ledger(&self) -> BuildLedger {
        let path = self.config.history_file();
        let limit = self.config.history_limit;
        BuildLedger::load(&path, limit).unwrap_or_else(|e| {
            self.log(
                Severity::Warning,
                format!("build history unreadable, starting fresh: {}", e),
            );
            BuildLedger::empty(&path, limit)
        })
    }

    fn record(&self, record: RunRecord) {
        if let Err(e) = self.load_ledger().record(record) {
            self.log(
                Severity::Warning,
                format!("{}: could not save build history: {}", Stage::Ledger, e),
            );
        }
    }

    fn clean_after_error(&self) -> Vec<PathBuf> {
        match clean::clean(&self.config, false) {
            Ok(removed) => {
                self.log(
                    Severity::Info,
                    format!("Removed {} derived artifacts", removed.len()),
                );
                removed
            }
            Err(e) => {
                self.log(Severity::Warning, format!("clean on error failed: {}", e));
                Vec::new()
            }
        }
    }

    /// Remove derived artifacts; `deep` also drops the fingerprint cache and history
    pub fn clean(&self, deep: bool) -> BuildResult<Vec<PathBuf>> {
        let removed = clean::clean(&self.config, deep)?;
        for path in &removed {
            self.log(
                Severity::Debug,
                format!("Removed {}", self.config.display_path(path).display()),
            );
        }
        Ok(removed)
    }

    /// The last `n` run records, oldest first
    pub fn history(&self, n: usize) -> BuildResult<Vec<RunRecord>> {
        let ledger = BuildLedger::load(self.config.history_file(), self.config.history_limit)?;
        Ok(ledger.recent(n).to_vec())
    }

    fn log(&self, severity: Severity, message: String) {
        self.sink.log(severity, &message);
    }
}
