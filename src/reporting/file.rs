// src/reporting/file.rs

//! Durable per-realization record of what happened.
//!
//! Inside the run path the file sink maintains:
//! - `status.jsonl`: one JSON object per message, appended as it arrives;
//! - `OK` or `ERROR`: written when the `Finish` message arrives;
//! - the resource log (`logs/memory-profile-*.csv`): one row per `Running`
//!   snapshot, behind a header row.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::errors::ReportingError;
use crate::message::{Message, MessageKind, ProcessTreeStatus};
use crate::types::StepRef;

pub const STATUS_LOG: &str = "status.jsonl";
pub const OK_FILE: &str = "OK";
pub const ERROR_FILE: &str = "ERROR";

const SINK: &str = "file";

/// Append-only CSV of process-tree snapshots.
#[derive(Debug)]
pub struct ResourceLog {
    path: PathBuf,
    file: File,
}

impl ResourceLog {
    /// Open (or create) `memory-profile-<stamp>.csv` in `dir`. The header is
    /// written when the file is new or empty.
    pub fn create(dir: &Path, started: DateTime<Local>) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "memory-profile-{}.csv",
            started.format("%Y-%m-%dT%H%M")
        ));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", ProcessTreeStatus::csv_header())?;
        }
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, step: &StepRef, status: &ProcessTreeStatus) -> io::Result<()> {
        writeln!(self.file, "{}", status.csv_row(step))
    }
}

/// Last failure seen, reported in the `ERROR` file.
#[derive(Debug, Clone)]
struct Failure {
    step: StepRef,
    exit_code: i32,
    error: Option<String>,
}

#[derive(Debug)]
pub struct FileSink {
    run_path: PathBuf,
    status_log: File,
    resource_log: ResourceLog,
    last_failure: Option<Failure>,
}

impl FileSink {
    /// Prepare the sink for a fresh run in `run_path`; stale `OK`/`ERROR`
    /// markers from an earlier attempt are removed.
    pub fn create(run_path: impl Into<PathBuf>, resource_log: ResourceLog) -> io::Result<Self> {
        let run_path = run_path.into();
        for marker in [OK_FILE, ERROR_FILE] {
            match fs::remove_file(run_path.join(marker)) {
                Ok(()) => debug!(marker, "removed stale status marker"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        let status_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(run_path.join(STATUS_LOG))?;

        Ok(Self {
            run_path,
            status_log,
            resource_log,
            last_failure: None,
        })
    }

    pub fn report(&mut self, message: &Message) -> Result<(), ReportingError> {
        let line = serde_json::to_string(message)?;
        writeln!(self.status_log, "{line}").map_err(|e| ReportingError::io(SINK, e))?;

        match (&message.kind, &message.step) {
            (MessageKind::Running { status }, Some(step)) => {
                self.resource_log
                    .append(step, status)
                    .map_err(|e| ReportingError::io(SINK, e))?;
            }
            (MessageKind::Exited { exit_code, error }, Some(step)) if *exit_code != 0 => {
                self.last_failure = Some(Failure {
                    step: step.clone(),
                    exit_code: *exit_code,
                    error: error.clone(),
                });
            }
            (MessageKind::Finish { success }, _) => {
                self.write_marker(*success, message.timestamp)
                    .map_err(|e| ReportingError::io(SINK, e))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn write_marker(&self, success: bool, at: DateTime<Utc>) -> io::Result<()> {
        let stamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
        if success {
            return fs::write(
                self.run_path.join(OK_FILE),
                format!("All steps complete {stamp}\n"),
            );
        }

        let mut text = format!("realization failed {stamp}\n");
        if let Some(failure) = &self.last_failure {
            text.push_str(&format!(
                "step: {}\nstep_index: {}\nexit_code: {}\n",
                failure.step.name, failure.step.index, failure.exit_code
            ));
            if let Some(error) = &failure.error {
                text.push_str(&format!("error: {error}\n"));
            }
        }
        fs::write(self.run_path.join(ERROR_FILE), text)
    }

    /// Flush what has been written. Never fails; problems are only logged.
    pub fn stop(&mut self) {
        if let Err(e) = self.status_log.flush() {
            warn!(error = %e, "failed to flush status log");
        }
    }
}
