//! Link-input ordering
//!
//! The object set is rebuilt from discovery order after compilation, so the
//! order in which workers finish never reaches the linker.

use crate::error::{BuildError, BuildResult};
use crate::source::{SourceKind, SourceUnit};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub object: PathBuf,
    pub kind: SourceKind,
}

/// Ordered link inputs: bootstrap first, compiled units in discovery order,
/// embedded resources last
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSet {
    entries: Vec<ObjectEntry>,
}

impl ObjectSet {
    /// Assemble from units in discovery order
    pub fn assemble(units: &[SourceUnit]) -> BuildResult<Self> {
        let rank = |kind: SourceKind| match kind {
            SourceKind::Bootstrap => 0,
            SourceKind::Ordinary | SourceKind::Assembly => 1,
            SourceKind::Resource => 2,
        };

        let mut ordered: Vec<&SourceUnit> = units.iter().collect();
        // Stable: discovery order survives within each rank
        ordered.sort_by_key(|u| rank(u.kind));

        let set = Self {
            entries: ordered
                .into_iter()
                .map(|u| ObjectEntry {
                    object: u.object.clone(),
                    kind: u.kind,
                })
                .collect(),
        };
        set.verify()?;
        Ok(set)
    }

    /// Check the bootstrap invariant
    pub fn verify(&self) -> BuildResult<()> {
        let bootstraps: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == SourceKind::Bootstrap)
            .map(|(i, _)| i)
            .collect();

        match bootstraps.as_slice() {
            [] | [0] => Ok(()),
            [i] => Err(BuildError::StageOrderingViolation(format!(
                "bootstrap object at position {} instead of 0",
                i
            ))),
            many => Err(BuildError::StageOrderingViolation(format!(
                "{} bootstrap objects in link set",
                many.len()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ObjectEntry] {
        &self.entries
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.object.clone()).collect()
    }

    pub fn first(&self) -> Option<&Path> {
        self.entries.first().map(|e| e.object.as_path())
    }
}
