// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::RunnerSettings;

/// Command-line arguments for `fmrunner`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fmrunner",
    version,
    about = "Run a realization's forward model steps and report their status.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FMRUNNER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run all steps in jobs.json, or only the named ones.
    Run(RunArgs),
    /// Receive status from realizations and print their start/finish events.
    Collect(CollectArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Directory containing jobs.json; steps run inside it.
    ///
    /// Default: the current working directory.
    #[arg(value_name = "RUN_PATH")]
    pub run_path: Option<PathBuf>,

    /// Steps to run. Naming steps switches to interactive console output.
    #[arg(value_name = "STEP")]
    pub steps: Vec<String>,

    /// Interval between resource samples of a running step.
    #[arg(long, value_name = "MS")]
    pub sample_interval_ms: Option<u64>,

    /// Seconds to wait before retrying a missing jobs.json once.
    #[arg(long, value_name = "SECS")]
    pub jobs_retry_secs: Option<u64>,
}

impl RunArgs {
    /// Runner settings with CLI overrides applied.
    pub fn settings(&self) -> RunnerSettings {
        let mut settings = RunnerSettings::default();
        if let Some(ms) = self.sample_interval_ms {
            settings.sample_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = self.jobs_retry_secs {
            settings.jobs_file_retry_wait = Duration::from_secs(secs);
        }
        settings
    }
}

#[derive(Debug, Clone, Args)]
pub struct CollectArgs {
    /// Address to listen on (`tcp://host:port`; port 0 picks a free port).
    #[arg(long, value_name = "URL", default_value = "tcp://127.0.0.1:0")]
    pub bind: String,

    /// Token senders must present when connecting.
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Realization indices to wait for.
    #[arg(long = "expect", value_name = "IENS", required = true, num_args = 1..)]
    pub expect: Vec<usize>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
