//! Build statistics and run history
//!
//! One `BuildStats` per run; at the end it is appended to the ledger, a flat
//! JSON array capped at a configured length with the oldest records evicted
//! first.

use crate::error::{BuildError, BuildResult};
use crate::fingerprint::write_atomic;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Counters for a single run
#[derive(Debug, Clone)]
pub struct BuildStats {
    /// Candidate units found by discovery
    pub total_files: usize,
    /// Units compiled successfully this run
    pub compiled: usize,
    /// Units reused without compiling
    pub cache_hits: usize,
    /// Units that needed compiling
    pub cache_misses: usize,
    pub started_at: DateTime<Utc>,
    started: Instant,
    finished: Option<Duration>,
}

impl BuildStats {
    pub fn start() -> Self {
        Self {
            total_files: 0,
            compiled: 0,
            cache_hits: 0,
            cache_misses: 0,
            started_at: Utc::now(),
            started: Instant::now(),
            finished: None,
        }
    }

    pub fn finish(&mut self) {
        if self.finished.is_none() {
            self.finished = Some(self.started.elapsed());
        }
    }

    /// Elapsed time; frozen once `finish` is called
    pub fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(|| self.started.elapsed())
    }
}

impl Default for BuildStats {
    fn default() -> Self {
        Self::start()
    }
}

/// One persisted history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// RFC 3339 start time
    pub timestamp: String,
    pub success: bool,
    /// OS version tag at the time of the run
    pub version: String,
    pub total_files: usize,
    pub compiled: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

impl RunRecord {
    pub fn new(stats: &BuildStats, success: bool, version: &str) -> Self {
        Self {
            timestamp: stats.started_at.to_rfc3339(),
            success,
            version: version.to_string(),
            total_files: stats.total_files,
            compiled: stats.compiled,
            cache_hits: stats.cache_hits,
            cache_misses: stats.cache_misses,
            elapsed_ms: stats.elapsed().as_millis() as u64,
            failed_stage: None,
        }
    }

    pub fn with_failed_stage(mut self, stage: impl Into<String>) -> Self {
        self.failed_stage = Some(stage.into());
        self
    }

    /// Start time in the local zone, for display
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Local))
    }
}

/// Capped, persisted run history
#[derive(Debug, Clone)]
pub struct BuildLedger {
    path: PathBuf,
    limit: usize,
    records: Vec<RunRecord>,
}

impl BuildLedger {
    /// Load the history; a missing file is an empty history
    pub fn load(path: impl Into<PathBuf>, limit: usize) -> BuildResult<Self> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| BuildError::CacheFormat {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(BuildError::cache_io(&path, e)),
        };
        Ok(Self {
            path,
            limit: limit.max(1),
            records,
        })
    }

    /// Empty history that persists to `path`
    pub fn empty(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit: limit.max(1),
            records: Vec::new(),
        }
    }

    /// Append a record, evict the oldest beyond the cap, persist
    pub fn record(&mut self, record: RunRecord) -> BuildResult<()> {
        self.records.push(record);
        if self.records.len() > self.limit {
            let excess = self.records.len() - self.limit;
            self.records.drain(..excess);
        }
        let json = serde_json::to_string_pretty(&self.records).map_err(|e| {
            BuildError::CacheFormat {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;
        write_atomic(&self.path, json.as_bytes())
    }

    /// The last `n` records, oldest first
    pub fn recent(&self, n: usize) -> &[RunRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
