//! Kiln kernel build pipeline
//!
//! Turns a kernel source tree into a bootable image:
//! - Source discovery with a reserved bootstrap unit
//! - Content-fingerprinted incremental compilation
//! - Parallel compilation with fail-fast scheduling
//! - Deterministic link ordering
//! - Post-link stages (raw binary, integrity check, ISO packaging,
//!   compression, backup)
//! - Persisted build history

pub mod clean;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod link;
pub mod log;
pub mod objects;
pub mod pipeline;
pub mod postprocess;
pub mod profile;
pub mod scheduler;
pub mod source;
pub mod stage;
pub mod state;
pub mod toolchain;

// Re-export main types
pub use config::{BuildConfig, BuildOverrides};
pub use error::{BuildError, BuildResult};
pub use fingerprint::{Fingerprint, FingerprintStore, Freshness};
pub use ledger::{BuildLedger, BuildStats, RunRecord};
pub use link::{LinkedImage, Linker};
pub use log::{LogSink, MemorySink, NullSink, Severity};
pub use objects::{ObjectEntry, ObjectSet};
pub use pipeline::{BuildReport, Pipeline, PipelineFailure, PipelineResult};
pub use postprocess::{PostprocessReport, Postprocessor};
pub use profile::{OptLevel, Profile, ProfileConfig};
pub use scheduler::{CompilePlan, CompileScheduler, CompileTask};
pub use source::{Language, SourceDiscoverer, SourceKind, SourceUnit};
pub use stage::{Stage, StageFailure, StageOutcome, StageWarning};
pub use state::{BuildState, LinkRecord};
pub use toolchain::{Invocation, ProcessRunner, ToolOutput, ToolRunner};
