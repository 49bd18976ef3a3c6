use std::fmt;

use serde::{Deserialize, Serialize};

/// Realization index.
pub type Iens = usize;

/// Identifies one step inside a realization's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRef {
    /// Position of the step in the jobs descriptor (file order).
    pub index: usize,
    pub name: String,
}

impl StepRef {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.index)
    }
}

/// How a run was invoked: explicit step names select interactive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// No step names given: all steps, fan-out to file (and network) sinks.
    Batch,
    /// Step names given on the command line: console reporting only.
    Interactive,
}

impl RunMode {
    pub fn from_step_filter(names: &[String]) -> Self {
        if names.is_empty() {
            RunMode::Batch
        } else {
            RunMode::Interactive
        }
    }
}
