// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `FMRUNNER_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! The subscriber is installed as the *thread-local* default and stays
//! active while the returned [`LoggingHandle`] is alive. The binary runs a
//! current-thread runtime, so every task sees it.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::dispatcher::DefaultGuard;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Where log lines go.
#[derive(Debug, Clone)]
pub enum LogTarget {
    /// Collector side: stderr, keeping stdout for events.
    Stderr,
    /// Runner side: a timestamped file in this directory.
    Directory(PathBuf),
}

/// Keeps the subscriber installed. Drop it to uninstall.
#[derive(Debug)]
pub struct LoggingHandle {
    _guard: DefaultGuard,
    log_file: Option<PathBuf>,
}

impl LoggingHandle {
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

pub fn init_logging(cli_level: Option<LogLevel>, target: LogTarget) -> Result<LoggingHandle> {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var("FMRUNNER_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO),
    };

    let builder = fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    match target {
        LogTarget::Stderr => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            Ok(LoggingHandle {
                _guard: tracing::subscriber::set_default(subscriber),
                log_file: None,
            })
        }
        LogTarget::Directory(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let path = dir.join(format!(
                "job-runner-log-{}.txt",
                Local::now().format("%Y-%m-%dT%H%M")
            ));
            let file = File::options()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;

            let subscriber = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            Ok(LoggingHandle {
                _guard: tracing::subscriber::set_default(subscriber),
                log_file: Some(path),
            })
        }
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_strings_leniently() {
        assert_eq!(parse_level_str(" Warning "), Some(tracing::Level::WARN));
        assert_eq!(parse_level_str("TRACE"), Some(tracing::Level::TRACE));
        assert_eq!(parse_level_str("loud"), None);
    }

    #[test]
    fn directory_target_writes_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = init_logging(Some(LogLevel::Info), LogTarget::Directory(dir.path().join("logs"))).unwrap();
        tracing::info!("hello from the runner");
        let path = handle.log_file().unwrap().to_path_buf();
        drop(handle);

        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.contains("hello from the runner"));
    }
}
