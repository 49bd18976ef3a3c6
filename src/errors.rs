// src/errors.rs

//! Crate-wide error types.
//!
//! Each layer owns a small `thiserror` enum; [`FmRunnerError`] aggregates
//! them for the top-level entry points.

use std::path::PathBuf;

use thiserror::Error;

/// Problems with the jobs descriptor or the step filter. Always fatal before
/// any step is started.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not find jobs file {}", .0.display())]
    JobsFileMissing(PathBuf),

    #[error("failed to read jobs file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("jobs file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid jobs descriptor: {0}")]
    Invalid(String),

    #[error("unknown step name(s): {}", .0.join(", "))]
    UnknownSteps(Vec<String>),

    #[error("invalid endpoint '{0}'")]
    Endpoint(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("no ack for frame {seq} after {attempts} attempts")]
    AckTimeout { seq: u64, attempts: u32 },

    #[error("connection closed by peer")]
    Closed,

    #[error("not connected")]
    NotConnected,
}

#[derive(Error, Debug)]
pub enum ReportingError {
    #[error("{sink} sink IO error: {source}")]
    Io {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("event sink transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("message serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("every reporter failed; no sink is left to receive status")]
    AllReportersFailed,
}

impl ReportingError {
    pub fn io(sink: &'static str, source: std::io::Error) -> Self {
        ReportingError::Io { sink, source }
    }
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("poll loop is already running")]
    AlreadyPolling,

    #[error("event queue closed before all expected realizations finished")]
    QueueClosed,

    #[error("poll task failed: {0}")]
    PollTask(String),
}

#[derive(Error, Debug)]
pub enum FmRunnerError {
    #[error("No such directory: {}", .0.display())]
    NoSuchDirectory(PathBuf),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Reporting error: {0}")]
    Reporting(#[from] ReportingError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FmRunnerError>;
