// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Iens;

/// Jobs descriptor as read from `jobs.json`.
///
/// ```json
/// {
///   "real_id": 3,
///   "ens_id": "ens-1",
///   "dispatch_url": "tcp://collector:5555",
///   "ee_token": "secret",
///   "global_environment": { "OMP_NUM_THREADS": "1" },
///   "jobList": [
///     { "name": "prepare", "executable": "/bin/prep", "argList": ["-v"] },
///     { "name": "plot", "executable": "/bin/plot", "required": false }
///   ]
/// }
/// ```
///
/// This is the unchecked form; use [`JobsDescriptor::try_from`] (or
/// [`crate::config::load_and_validate`]) to obtain a validated descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawJobsDescriptor {
    #[serde(default)]
    pub real_id: Iens,

    #[serde(default)]
    pub experiment_id: Option<String>,

    #[serde(default)]
    pub ens_id: Option<String>,

    /// Collector endpoint for the event sink (`tcp://host:port`).
    #[serde(default)]
    pub dispatch_url: Option<String>,

    /// Token presented to the collector in the Connect frame.
    #[serde(default)]
    pub ee_token: Option<String>,

    /// Environment applied to every step before the step's own overrides.
    #[serde(default)]
    pub global_environment: BTreeMap<String, String>,

    #[serde(rename = "jobList", default)]
    pub steps: Vec<StepDefinition>,
}

/// One `jobList` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,

    pub executable: String,

    #[serde(rename = "argList", default)]
    pub args: Vec<String>,

    /// A failing required step aborts the rest of the pipeline.
    #[serde(default = "default_required")]
    pub required: bool,

    /// File (relative to the run path) receiving the step's stdout.
    #[serde(default)]
    pub stdout: Option<String>,

    /// File (relative to the run path) receiving the step's stderr.
    #[serde(default)]
    pub stderr: Option<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

fn default_required() -> bool {
    true
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: Vec::new(),
            required: true,
            stdout: None,
            stderr: None,
            environment: BTreeMap::new(),
        }
    }
}

/// Validated jobs descriptor.
#[derive(Debug, Clone)]
pub struct JobsDescriptor {
    raw: RawJobsDescriptor,
}

impl JobsDescriptor {
    pub(crate) fn new_unchecked(raw: RawJobsDescriptor) -> Self {
        Self { raw }
    }

    pub fn realization(&self) -> Iens {
        self.raw.real_id
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.raw.steps
    }

    pub fn experiment_id(&self) -> Option<&str> {
        self.raw.experiment_id.as_deref()
    }

    pub fn ens_id(&self) -> Option<&str> {
        self.raw.ens_id.as_deref()
    }

    pub fn dispatch_url(&self) -> Option<&str> {
        self.raw.dispatch_url.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.raw.ee_token.as_deref()
    }

    pub fn global_environment(&self) -> &BTreeMap<String, String> {
        &self.raw.global_environment
    }

    pub fn raw(&self) -> &RawJobsDescriptor {
        &self.raw
    }
}

/// Wait before the single retry when `jobs.json` is not there yet.
pub const JOBS_FILE_RETRY_WAIT: Duration = Duration::from_secs(30);

/// Tunables for one realization run.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Interval between process-tree samples of a running step.
    pub sample_interval: Duration,
    /// How long the event sink waits for each Ack.
    pub ack_timeout: Duration,
    /// Retransmissions after the first attempt before a frame is given up.
    pub ack_retries: u32,
    /// Wait before the single retry of a missing jobs file.
    pub jobs_file_retry_wait: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            ack_timeout: Duration::from_secs(2),
            ack_retries: 3,
            jobs_file_retry_wait: JOBS_FILE_RETRY_WAIT,
        }
    }
}
