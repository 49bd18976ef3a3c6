// src/exec/runner.rs

//! Runs the selected steps of one realization in order.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{JobsDescriptor, RunnerSettings, select_steps};
use crate::errors::ConfigError;
use crate::exec::step::{ConsumerGone, StepContext, StepOutcome, run_step};
use crate::message::Message;
use crate::types::StepRef;

/// Messages buffered ahead of the consumer. Small on purpose: the runner
/// only advances as the reporters keep up.
const MESSAGE_BUFFER: usize = 16;

/// Executes a realization's steps and produces its status messages.
///
/// A runner is used once: [`JobRunner::start`] consumes it, and there is no
/// way to resume a run from the middle.
#[derive(Debug)]
pub struct JobRunner {
    descriptor: JobsDescriptor,
    settings: RunnerSettings,
    run_path: PathBuf,
}

impl JobRunner {
    pub fn new(descriptor: JobsDescriptor, settings: RunnerSettings, run_path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            settings,
            run_path: run_path.into(),
        }
    }

    /// Validate the step filter and start the run in a background task.
    ///
    /// Unknown step names are rejected here, before anything is spawned.
    /// The returned receiver yields `Start`/`Running`/`Exited` per executed
    /// step and ends with exactly one `Finish`.
    pub fn start(self, names: &[String]) -> Result<mpsc::Receiver<Message>, ConfigError> {
        self.spawn(names).map(|(messages, _)| messages)
    }

    /// Like [`JobRunner::start`], also returning a handle on the supervising
    /// task.
    pub fn spawn(self, names: &[String]) -> Result<(mpsc::Receiver<Message>, RunSupervisor), ConfigError> {
        let selected = select_steps(&self.descriptor, names)?;
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);

        info!(
            realization = self.descriptor.realization(),
            steps = selected.len(),
            "starting realization run"
        );

        let task = tokio::spawn(async move {
            if self.run_selected(&selected, &tx).await.is_err() {
                debug!("message consumer went away; stopping run");
            }
        });

        Ok((rx, RunSupervisor { task }))
    }

    async fn run_selected(
        &self,
        selected: &[usize],
        tx: &mpsc::Sender<Message>,
    ) -> Result<(), ConsumerGone> {
        let realization = self.descriptor.realization();
        let ctx = StepContext {
            realization,
            run_path: &self.run_path,
            descriptor: &self.descriptor,
            settings: &self.settings,
            tx,
        };

        let mut success = true;
        for &index in selected {
            let def = &self.descriptor.steps()[index];
            let step = StepRef::new(index, def.name.clone());
            let outcome = run_step(&ctx, step, def).await?;

            if outcome.succeeded() {
                continue;
            }
            match outcome {
                StepOutcome::Exited(code) if !def.required => {
                    warn!(step = %def.name, exit_code = code, "optional step failed; continuing");
                }
                _ => {
                    warn!(step = %def.name, ?outcome, "required step failed; aborting remaining steps");
                    success = false;
                    break;
                }
            }
        }

        info!(realization, success, "realization run finished");
        tx.send(Message::finish(realization, success)).await?;
        Ok(())
    }
}

/// Handle on a started run's supervising task.
#[derive(Debug)]
pub struct RunSupervisor {
    task: JoinHandle<()>,
}

impl RunSupervisor {
    /// Stop the run and wait until the supervising task is gone. The step
    /// process still running is killed when its handle is dropped.
    pub async fn abort(self) {
        self.task.abort();
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("run supervisor aborted"),
            Err(e) => warn!(error = %e, "run supervisor ended abnormally"),
        }
    }
}
