//! Pipeline stage names and per-stage outcomes

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Discover,
    Compile,
    Link,
    ExtractBinary,
    Integrity,
    Package,
    Compress,
    Backup,
    Ledger,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Compile => "compile",
            Self::Link => "link",
            Self::ExtractBinary => "extract-binary",
            Self::Integrity => "integrity",
            Self::Package => "package",
            Self::Compress => "compress",
            Self::Backup => "backup",
            Self::Ledger => "ledger",
        }
    }

    /// Whether a failure in this stage only warns
    pub fn is_best_effort(&self) -> bool {
        matches!(
            self,
            Self::Integrity | Self::Compress | Self::Backup | Self::Ledger
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a stage ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// Output already newer than its input
    UpToDate,
    /// Turned off by configuration
    Disabled,
    /// Best-effort stage whose tool could not be located
    ToolMissing(String),
    /// Best-effort stage that failed or reported findings
    Warned(String),
}

impl StageOutcome {
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::ToolMissing(_) | Self::Warned(_))
    }
}

/// A non-fatal problem recorded in the build report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWarning {
    pub stage: Stage,
    pub message: String,
}

/// A fatal failure, attributed to the stage that raised it
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: BuildError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: BuildError) -> Self {
        Self { stage, error }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Downgrade a best-effort error to an outcome
pub fn best_effort(error: BuildError) -> StageOutcome {
    match error {
        BuildError::ToolNotFound { tool } => {
            StageOutcome::ToolMissing(format!("tool not found: {}", tool))
        }
        other => StageOutcome::Warned(other.to_string()),
    }
}
