//! Parallel compile scheduling
//!
//! Workers run compile tasks on a bounded rayon pool and report back over a
//! channel. The calling thread is the only writer to the fingerprint store:
//! it commits digests as results arrive, latches the first failure, and
//! drains the channel before returning.

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::fingerprint::{Fingerprint, FingerprintStore};
use crate::ledger::BuildStats;
use crate::log::{LogSink, Severity};
use crate::objects::ObjectSet;
use crate::source::SourceUnit;
use crate::toolchain::{compile_invocation, run_tool, Invocation, ToolRunner};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// One unit of compile work; consumed by a worker
#[derive(Debug, Clone)]
pub struct CompileTask {
    pub unit: SourceUnit,
    pub invocation: Invocation,
}

/// Split of discovered units into work and reuse
#[derive(Debug, Default)]
pub struct CompilePlan {
    pub tasks: Vec<CompileTask>,
    pub reused: Vec<SourceUnit>,
}

/// Worker report for one task
#[derive(Debug)]
enum TaskOutcome {
    Compiled {
        index: usize,
        fingerprint: Option<Fingerprint>,
    },
    Failed {
        index: usize,
        error: BuildError,
    },
    /// Picked up after the failure latch tripped; no tool was run
    Cancelled,
}

pub struct CompileScheduler<'a> {
    config: &'a BuildConfig,
    runner: Arc<dyn ToolRunner>,
    sink: Arc<dyn LogSink>,
}

impl<'a> CompileScheduler<'a> {
    pub fn new(config: &'a BuildConfig, runner: Arc<dyn ToolRunner>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            config,
            runner,
            sink,
        }
    }

    /// Decide which units need compiling
    pub fn plan(&self, units: &[SourceUnit], store: &FingerprintStore) -> CompilePlan {
        let incremental = self.config.incremental();
        let mut plan = CompilePlan::default();

        for unit in units {
            let freshness = store.freshness(unit, incremental);
            self.sink.log(
                Severity::Debug,
                &format!("{}: {}", unit.rel.display(), freshness.describe()),
            );
            if freshness.needs_rebuild() {
                plan.tasks.push(CompileTask {
                    invocation: compile_invocation(self.config, unit),
                    unit: unit.clone(),
                });
            } else {
                plan.reused.push(unit.clone());
            }
        }
        plan
    }

    /// Compile whatever is stale and return the ordered link inputs
    ///
    /// On failure no object set is returned; fingerprints of units that did
    /// compile are still committed to `store`.
    pub fn schedule(
        &self,
        units: &[SourceUnit],
        store: &mut FingerprintStore,
        stats: &mut BuildStats,
    ) -> BuildResult<ObjectSet> {
        let plan = self.plan(units, store);
        stats.total_files = units.len();
        stats.cache_hits = plan.reused.len();
        stats.cache_misses = plan.tasks.len();

        if plan.tasks.is_empty() {
            self.sink.log(Severity::Info, "All objects up to date");
        } else {
            self.sink.log(
                Severity::Info,
                &format!(
                    "Compiling {} of {} units ({} job{})",
                    plan.tasks.len(),
                    units.len(),
                    self.config.jobs,
                    if self.config.jobs == 1 { "" } else { "s" }
                ),
            );
            let compiled = if self.config.jobs <= 1 {
                self.run_sequential(&plan.tasks, store)
            } else {
                self.run_parallel(&plan.tasks, store)
            };
            match compiled {
                Ok(n) => stats.compiled = n,
                Err((n, error)) => {
                    stats.compiled = n;
                    return Err(error);
                }
            }
        }

        ObjectSet::assemble(units)
    }

    /// Run tasks one at a time, stopping at the first failure
    fn run_sequential(
        &self,
        tasks: &[CompileTask],
        store: &mut FingerprintStore,
    ) -> Result<usize, (usize, BuildError)> {
        let mut compiled = 0;
        for task in tasks {
            match execute(task, self.runner.as_ref(), self.sink.as_ref()) {
                Ok(fingerprint) => {
                    compiled += 1;
                    if let Some(fp) = fingerprint {
                        store.commit(&task.unit.path, fp);
                    }
                }
                Err(error) => return Err((compiled, error)),
            }
        }
        Ok(compiled)
    }

    /// Run tasks on a bounded pool with fail-fast latching
    fn run_parallel(
        &self,
        tasks: &[CompileTask],
        store: &mut FingerprintStore,
    ) -> Result<usize, (usize, BuildError)> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .thread_name(|i| format!("kiln-cc-{}", i))
            .build()
            .map_err(|e| (0, BuildError::Scheduler(e.to_string())))?;

        let latch = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<TaskOutcome>();
        let mut compiled = 0;
        let mut failure: Option<BuildError> = None;
        let mut received = 0;

        pool.in_place_scope(|scope| {
            for (index, task) in tasks.iter().enumerate() {
                let tx = tx.clone();
                let latch = &latch;
                let runner = self.runner.as_ref();
                let sink = self.sink.as_ref();
                scope.spawn(move |_| {
                    let outcome = if latch.load(Ordering::Acquire) {
                        TaskOutcome::Cancelled
                    } else {
                        match execute(task, runner, sink) {
                            Ok(fingerprint) => TaskOutcome::Compiled { index, fingerprint },
                            Err(error) => {
                                latch.store(true, Ordering::Release);
                                TaskOutcome::Failed { index, error }
                            }
                        }
                    };
                    // Receiver outlives the scope
                    let _ = tx.send(outcome);
                });
            }
            drop(tx);

            // Single writer: only this loop touches the store
            for outcome in rx.iter() {
                received += 1;
                match outcome {
                    TaskOutcome::Compiled { index, fingerprint } => {
                        compiled += 1;
                        if let Some(fp) = fingerprint {
                            store.commit(&tasks[index].unit.path, fp);
                        }
                    }
                    TaskOutcome::Failed { index, error } => {
                        if failure.is_none() {
                            failure = Some(error);
                        } else {
                            self.sink.log(
                                Severity::Debug,
                                &format!(
                                    "{}: also failed after fail-fast",
                                    tasks[index].unit.rel.display()
                                ),
                            );
                        }
                    }
                    TaskOutcome::Cancelled => {}
                }
            }
        });

        if received != tasks.len() && failure.is_none() {
            failure = Some(BuildError::Scheduler(format!(
                "{} of {} compile tasks never reported",
                tasks.len() - received,
                tasks.len()
            )));
        }

        match failure {
            Some(error) => Err((compiled, error)),
            None => Ok(compiled),
        }
    }
}

/// Compile one unit and hash its source on success
fn execute(
    task: &CompileTask,
    runner: &dyn ToolRunner,
    sink: &dyn LogSink,
) -> BuildResult<Option<Fingerprint>> {
    let unit = &task.unit;
    if let Some(parent) = unit.object.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }

    sink.log(Severity::Debug, &task.invocation.command_line());
    let output = run_tool(runner, &task.invocation)?;

    if !output.success() {
        return Err(BuildError::compile(&unit.rel, output.diagnostic()));
    }
    if !output.stderr.trim().is_empty() {
        sink.log(
            Severity::Warning,
            &format!("{}:\n{}", unit.rel.display(), output.stderr.trim_end()),
        );
    }
    sink.log(Severity::Info, &format!("Compiled {}", unit.rel.display()));

    // A source that vanished after compiling simply stays unrecorded
    Ok(Fingerprint::of_file(&unit.path).ok())
}
