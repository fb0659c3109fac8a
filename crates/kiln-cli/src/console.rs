//! Terminal log sink
//!
//! Progress goes to stdout, warnings and errors to stderr. Colors come from
//! `colored`, which already honors `NO_COLOR`; `--no-color` forces them off.

use colored::*;
use kiln_build::{LogSink, Severity};

/// How much the console shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    #[default]
    Normal,
    /// Also every tool command line and cache decision
    Verbose,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Lowest severity printed
    fn threshold(&self) -> Severity {
        match self {
            Self::Quiet => Severity::Error,
            Self::Normal => Severity::Info,
            Self::Verbose => Severity::Debug,
        }
    }
}

pub struct ConsoleSink {
    verbosity: Verbosity,
}

impl ConsoleSink {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn shows(&self, severity: Severity) -> bool {
        severity >= self.verbosity.threshold()
    }
}

impl LogSink for ConsoleSink {
    fn log(&self, severity: Severity, message: &str) {
        if !self.shows(severity) {
            return;
        }
        match severity {
            Severity::Debug => println!("  {}", message.dimmed()),
            Severity::Info => println!("{} {}", "::".blue().bold(), message),
            Severity::Success => println!("{} {}", "ok".green().bold(), message),
            Severity::Warning => eprintln!("{} {}", "warning:".yellow().bold(), message),
            Severity::Error => eprintln!("{} {}", "error:".red().bold(), message),
        }
    }
}

/// Turn colors off for the rest of the process
pub fn disable_colors() {
    colored::control::set_override(false);
}
