// src/message.rs

//! Status messages produced by the job runner.
//!
//! A realization run produces `Start`, `Running` and `Exited` messages for
//! each executed step, followed by exactly one `Finish`. Messages are
//! immutable; they are serialized with serde for the file sink and for Data
//! frames on the wire.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Iens, StepRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub realization: Iens,
    /// `None` only for `Finish`, which concerns the whole realization.
    pub step: Option<StepRef>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageKind {
    Start,
    Running {
        status: ProcessTreeStatus,
    },
    Exited {
        exit_code: i32,
        #[serde(default)]
        error: Option<String>,
    },
    Finish {
        success: bool,
    },
}

impl Message {
    pub fn start(realization: Iens, step: StepRef) -> Self {
        Self::for_step(realization, step, MessageKind::Start)
    }

    pub fn running(realization: Iens, step: StepRef, status: ProcessTreeStatus) -> Self {
        Self::for_step(realization, step, MessageKind::Running { status })
    }

    pub fn exited(realization: Iens, step: StepRef, exit_code: i32, error: Option<String>) -> Self {
        Self::for_step(realization, step, MessageKind::Exited { exit_code, error })
    }

    pub fn finish(realization: Iens, success: bool) -> Self {
        Self {
            realization,
            step: None,
            timestamp: Utc::now(),
            kind: MessageKind::Finish { success },
        }
    }

    fn for_step(realization: Iens, step: StepRef, kind: MessageKind) -> Self {
        Self {
            realization,
            step: Some(step),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self.kind, MessageKind::Finish { .. })
    }

    /// `Some(success)` for a `Finish` message.
    pub fn finish_success(&self) -> Option<bool> {
        match self.kind {
            MessageKind::Finish { success } => Some(success),
            _ => None,
        }
    }

    /// Short lowercase name of the variant, as used on the wire.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            MessageKind::Start => "start",
            MessageKind::Running { .. } => "running",
            MessageKind::Exited { .. } => "exited",
            MessageKind::Finish { .. } => "finish",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        let step = self
            .step
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());

        match &self.kind {
            MessageKind::Start => write!(f, "{ts} realization {} step {step}: start", self.realization),
            MessageKind::Running { status } => write!(
                f,
                "{ts} realization {} step {step}: running (rss {} B, max {} B, cpu {:.2}s)",
                self.realization, status.rss_bytes, status.max_rss_bytes, status.cpu_seconds
            ),
            MessageKind::Exited { exit_code, error } => {
                write!(f, "{ts} realization {} step {step}: exited with {exit_code}", self.realization)?;
                if let Some(error) = error {
                    write!(f, " ({error})")?;
                }
                Ok(())
            }
            MessageKind::Finish { success } => write!(
                f,
                "{ts} realization {}: finished, success={success}",
                self.realization
            ),
        }
    }
}

/// Resource usage of a step's process tree at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessTreeStatus {
    pub timestamp: DateTime<Utc>,
    /// Resident memory of the whole tree right now.
    pub rss_bytes: u64,
    /// Largest `rss_bytes` seen so far for this step.
    pub max_rss_bytes: u64,
    /// User + system CPU time accumulated by the tree.
    pub cpu_seconds: f64,
    pub oom_killed: bool,
}

const CSV_COLUMNS: [&str; 7] = [
    "timestamp",
    "step_index",
    "step_name",
    "rss_bytes",
    "max_rss_bytes",
    "cpu_seconds",
    "oom_killed",
];

impl ProcessTreeStatus {
    /// Header row of the resource log. Column order matches [`Self::csv_row`].
    pub fn csv_header() -> String {
        CSV_COLUMNS.join(",")
    }

    pub fn csv_row(&self, step: &StepRef) -> String {
        format!(
            "{},{},{},{},{},{:.3},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            step.index,
            csv_field(&step.name),
            self.rss_bytes,
            self.max_rss_bytes,
            self.cpu_seconds,
            self.oom_killed
        )
    }
}

/// Quote a field if it would otherwise break the row.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
