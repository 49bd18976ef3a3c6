// src/lib.rs

pub mod cli;
pub mod config;
pub mod driver;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod message;
pub mod reporting;
pub mod transport;
pub mod types;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::cli::{CliArgs, CollectArgs, Command, LogLevel, RunArgs};
use crate::config::{jobs_file_path, load_and_validate, select_steps};
use crate::driver::{Driver, PollHooks};
use crate::errors::{FmRunnerError, Result};
use crate::exec::JobRunner;
use crate::logging::{LogTarget, init_logging};
use crate::reporting::{
    FanoutOutcome, HardShutdown, KillOwnProcessGroup, report_all_messages, setup_reporters,
    wait_for_termination,
};
use crate::transport::parse_endpoint;
use crate::types::{Iens, RunMode};

/// Log and resource-profile directory, relative to the run path.
pub const LOG_DIR: &str = "logs";

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run(run_args) => run_realization(run_args, args.log_level).await.map(|_| ()),
        Command::Collect(collect_args) => run_collector(collect_args, args.log_level).await,
    }
}

/// Run one realization's steps in `run_path` and report their status.
///
/// This wires together:
/// - logging into `logs/` of the run path
/// - jobs.json loading (with its single retry)
/// - reporter selection
/// - the job runner and the fan-out loop, including the hard shutdown
pub async fn run_realization(args: RunArgs, log_level: Option<LogLevel>) -> Result<FanoutOutcome> {
    let run_path = resolve_run_path(args.run_path.clone())?;
    let log_dir = run_path.join(LOG_DIR);
    let _logging = init_logging(log_level, LogTarget::Directory(log_dir.clone()))?;

    let settings = args.settings();
    let descriptor = load_and_validate(jobs_file_path(&run_path), settings.jobs_file_retry_wait).await?;
    select_steps(&descriptor, &args.steps)?;

    let mode = RunMode::from_step_filter(&args.steps);
    let mut reporters = setup_reporters(mode, &descriptor, &settings, &run_path, &log_dir)?;

    let runner = JobRunner::new(descriptor, settings, run_path);
    let (messages, supervisor) = runner.spawn(&args.steps)?;

    let shutdown = HardShutdown::new(KillOwnProcessGroup);
    let outcome = match report_all_messages(messages, &mut reporters, &shutdown, termination_requested()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "giving up on the run");
            supervisor.abort().await;
            return Err(e.into());
        }
    };

    info!(?outcome, "realization run ended");
    Ok(outcome)
}

/// Resolves on SIGTERM/SIGINT. Never resolves if the handlers could not be
/// installed.
async fn termination_requested() {
    if let Err(e) = wait_for_termination().await {
        warn!(error = %e, "could not listen for termination signals");
        std::future::pending::<()>().await;
    }
}

/// Listen for realizations and print their start/finish events until every
/// expected realization has finished.
pub async fn run_collector(args: CollectArgs, log_level: Option<LogLevel>) -> Result<()> {
    let _logging = init_logging(log_level, LogTarget::Stderr)?;

    let addr = parse_endpoint(&args.bind)?;
    let mut driver = Driver::bind(&addr, args.token.clone()).await?;
    println!("listening on {}", driver.dispatch_url());

    let expected: BTreeSet<Iens> = args.expect.iter().copied().collect();
    let mut failed: Vec<Iens> = Vec::new();

    let hooks = PollHooks::new()
        .on_started(|iens| println!("started  {iens}"))
        .on_finished(|iens, returncode| {
            println!("finished {iens} returncode={returncode}");
            if returncode != 0 {
                failed.push(iens);
            }
        });

    let polled = tokio::select! {
        res = crate::driver::poll(&mut driver, &expected, hooks) => res.map_err(FmRunnerError::from),
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted").into()),
    };
    // A no-op when `poll` already finished the driver.
    driver.finish().await?;
    polled?;

    if !failed.is_empty() {
        return Err(anyhow!("realization(s) failed: {failed:?}").into());
    }
    Ok(())
}

/// The directory steps run in: the given path, or the working directory.
pub fn resolve_run_path(run_path: Option<PathBuf>) -> Result<PathBuf> {
    match run_path {
        Some(path) if path.is_dir() => Ok(path),
        Some(path) => Err(FmRunnerError::NoSuchDirectory(path)),
        None => Ok(std::env::current_dir()?),
    }
}
