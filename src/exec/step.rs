// src/exec/step.rs

//! Supervision of a single step process.

use std::fs::File;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{JobsDescriptor, RunnerSettings, StepDefinition};
use crate::exec::sampler::ProcessTreeSampler;
use crate::message::Message;
use crate::types::{Iens, StepRef};

/// Exit code reported for a step whose process could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// The consumer of the message stream has gone away.
#[derive(Debug)]
pub(crate) struct ConsumerGone;

impl<T> From<mpsc::error::SendError<T>> for ConsumerGone {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        ConsumerGone
    }
}

/// How one step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Exited(i32),
    SpawnFailed,
}

impl StepOutcome {
    pub fn succeeded(self) -> bool {
        matches!(self, StepOutcome::Exited(0))
    }
}

/// Everything a step needs besides its own definition.
pub(crate) struct StepContext<'a> {
    pub realization: Iens,
    pub run_path: &'a Path,
    pub descriptor: &'a JobsDescriptor,
    pub settings: &'a RunnerSettings,
    pub tx: &'a mpsc::Sender<Message>,
}

/// Run one step to completion, emitting `Start`, `Running`* and `Exited`.
///
/// Spawn problems are not errors here: they become an `Exited` message with
/// [`SPAWN_FAILURE_EXIT_CODE`]. The only error is the consumer disappearing.
pub(crate) async fn run_step(
    ctx: &StepContext<'_>,
    step: StepRef,
    def: &StepDefinition,
) -> std::result::Result<StepOutcome, ConsumerGone> {
    ctx.tx
        .send(Message::start(ctx.realization, step.clone()))
        .await?;

    let mut child = match build_command(ctx, def).and_then(|mut cmd| {
        cmd.spawn()
            .with_context(|| format!("failed to spawn '{}'", def.executable))
    }) {
        Ok(child) => child,
        Err(err) => {
            warn!(step = %step.name, error = %format!("{err:#}"), "step could not be started");
            ctx.tx
                .send(Message::exited(
                    ctx.realization,
                    step,
                    SPAWN_FAILURE_EXIT_CODE,
                    Some(format!("{err:#}")),
                ))
                .await?;
            return Ok(StepOutcome::SpawnFailed);
        }
    };

    let pid = child.id().unwrap_or_default();
    info!(step = %step.name, pid, executable = %def.executable, "step process started");

    let mut sampler = ProcessTreeSampler::new(pid);
    let mut ticker = time::interval(ctx.settings.sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let wait_result = loop {
        tokio::select! {
            res = child.wait() => break res,
            _ = ticker.tick() => {
                if let Some(status) = sampler.sample() {
                    ctx.tx
                        .send(Message::running(ctx.realization, step.clone(), status))
                        .await?;
                }
            }
        }
    };

    let (exit_code, error) = match wait_result {
        Ok(status) => describe_exit(status, sampler.check_oom()),
        Err(e) => (
            SPAWN_FAILURE_EXIT_CODE,
            Some(format!("failed waiting for process: {e}")),
        ),
    };

    info!(step = %step.name, pid, exit_code, "step process exited");
    ctx.tx
        .send(Message::exited(ctx.realization, step, exit_code, error))
        .await?;
    Ok(StepOutcome::Exited(exit_code))
}

fn build_command(ctx: &StepContext<'_>, def: &StepDefinition) -> Result<Command> {
    let mut cmd = Command::new(&def.executable);
    cmd.args(&def.args)
        .current_dir(ctx.run_path)
        .envs(ctx.descriptor.global_environment())
        .envs(&def.environment)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    cmd.stdout(redirect(ctx.run_path, def.stdout.as_deref())?);
    cmd.stderr(redirect(ctx.run_path, def.stderr.as_deref())?);

    debug!(step = %def.name, args = ?def.args, "built step command");
    Ok(cmd)
}

fn redirect(run_path: &Path, target: Option<&str>) -> Result<Stdio> {
    match target {
        Some(name) => {
            let path = run_path.join(name);
            let file = File::create(&path)
                .with_context(|| format!("failed to open output file {}", path.display()))?;
            Ok(Stdio::from(file))
        }
        None => Ok(Stdio::inherit()),
    }
}

/// Map an exit status to a returncode and an optional error description.
pub(crate) fn describe_exit(status: ExitStatus, oom_killed: bool) -> (i32, Option<String>) {
    if status.success() {
        return (0, None);
    }

    let (code, mut error) = match status.code() {
        Some(code) => (code, format!("Process exited with status code {code}")),
        None => {
            let signal = terminating_signal(status).unwrap_or(0);
            (128 + signal, format!("Process killed by signal {signal}"))
        }
    };
    if oom_killed {
        error.push_str(" (killed by the OOM killer)");
    }
    (code, Some(error))
}

#[cfg(unix)]
fn terminating_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: ExitStatus) -> Option<i32> {
    None
}
