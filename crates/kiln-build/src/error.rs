/// Build pipeline error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{tool} failed: {diagnostic}")]
    ToolInvocation { tool: String, diagnostic: String },

    #[error("Tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("Compilation failed for '{}':\n{diagnostic}", unit.display())]
    CompileFailed { unit: PathBuf, diagnostic: String },

    #[error("Cache I/O error at {path}: {source}")]
    CacheIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt cache file {path}: {reason}")]
    CacheFormat { path: PathBuf, reason: String },

    #[error("Link order violated: {0}")]
    StageOrderingViolation(String),

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Invalid build configuration: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Missing input: {}", path.display())]
    MissingInput { path: PathBuf },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create a tool invocation error
    pub fn tool(tool: impl Into<String>, diagnostic: impl ToString) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            diagnostic: diagnostic.to_string(),
        }
    }

    /// Create a compile failure for a source unit
    pub fn compile(unit: impl Into<PathBuf>, diagnostic: impl ToString) -> Self {
        Self::CompileFailed {
            unit: unit.into(),
            diagnostic: diagnostic.to_string(),
        }
    }

    /// Create a cache I/O error
    pub fn cache_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means a tool could not be located
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. })
    }
}
