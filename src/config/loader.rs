// src/config/loader.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error};

use crate::config::model::{JobsDescriptor, RawJobsDescriptor};
use crate::errors::ConfigError;

/// File name of the jobs descriptor inside a run path.
pub const JOBS_FILE: &str = "jobs.json";

/// Retries after the first read when the jobs file is missing.
const MISSING_FILE_RETRIES: u32 = 1;

/// Parse a jobs descriptor from a JSON string without semantic validation.
pub fn parse_raw(contents: &str) -> Result<RawJobsDescriptor, ConfigError> {
    Ok(serde_json::from_str(contents)?)
}

/// Read the raw jobs descriptor at `path`.
///
/// Distributed file systems may not have propagated the file to this node
/// yet, so a missing file is retried exactly once after `retry_wait`. Any
/// other failure, or a second miss, is returned immediately.
pub async fn read_jobs_file(
    path: impl AsRef<Path>,
    retry_wait: Duration,
) -> Result<RawJobsDescriptor, ConfigError> {
    let path = path.as_ref();
    let mut retries_left = MISSING_FILE_RETRIES;

    loop {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                debug!(path = %path.display(), bytes = contents.len(), "read jobs file");
                return parse_raw(&contents);
            }
            Err(e) if e.kind() == ErrorKind::NotFound && retries_left > 0 => {
                retries_left -= 1;
                error!(
                    path = %path.display(),
                    wait_secs = retry_wait.as_secs_f64(),
                    "could not find jobs file, retrying"
                );
                tokio::time::sleep(retry_wait).await;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::JobsFileMissing(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
}

/// Read and validate the jobs descriptor.
///
/// This is the entry point used by the runner binary.
pub async fn load_and_validate(
    path: impl AsRef<Path>,
    retry_wait: Duration,
) -> Result<JobsDescriptor, ConfigError> {
    let raw = read_jobs_file(path, retry_wait).await?;
    JobsDescriptor::try_from(raw)
}

/// Location of the jobs file for a given run path.
pub fn jobs_file_path(run_path: impl AsRef<Path>) -> PathBuf {
    run_path.as_ref().join(JOBS_FILE)
}
