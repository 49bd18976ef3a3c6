// src/reporting/mod.rs

//! Fan-out of a realization's status messages to its sinks.
//!
//! - [`reporter`]: the `Reporter` capability and the `Sink` variants.
//! - [`file`], [`interactive`], [`event`]: the three sinks.
//! - [`fanout`]: the delivery loop with per-reporter fault isolation.
//! - [`shutdown`]: the hard-kill path and termination signal handling.

pub mod event;
pub mod fanout;
pub mod file;
pub mod interactive;
pub mod reporter;
pub mod shutdown;

use std::path::Path;

use chrono::Local;
use tracing::info;

use crate::config::{JobsDescriptor, RunnerSettings};
use crate::errors::{ReportingError, Result};
use crate::transport::parse_endpoint;
use crate::types::RunMode;

pub use event::EventSink;
pub use fanout::{FanoutOutcome, deliver, report_all_messages};
pub use file::{ERROR_FILE, FileSink, OK_FILE, ResourceLog, STATUS_LOG};
pub use interactive::InteractiveSink;
pub use reporter::{ReportFuture, Reporter, Sink};
pub use shutdown::{HardShutdown, KillOwnProcessGroup, ProcessGroupKiller, stop_reporters, wait_for_termination};

/// Which sinks a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    File,
    Interactive,
    Event,
}

/// Decide the sink set.
///
/// Interactive runs only talk to the console. Otherwise the file sink is
/// always present, and the event sink is added when the descriptor belongs
/// to an ensemble evaluation (an `ens_id`, no `experiment_id`) and names a
/// collector.
pub fn sink_plan(mode: RunMode, descriptor: &JobsDescriptor) -> Vec<SinkKind> {
    match mode {
        RunMode::Interactive => vec![SinkKind::Interactive],
        RunMode::Batch => {
            let evaluated = descriptor.ens_id().is_some()
                && descriptor.experiment_id().is_none()
                && descriptor.dispatch_url().is_some();
            if evaluated {
                vec![SinkKind::File, SinkKind::Event]
            } else {
                vec![SinkKind::File]
            }
        }
    }
}

/// Build the sinks named by [`sink_plan`].
pub fn setup_reporters(
    mode: RunMode,
    descriptor: &JobsDescriptor,
    settings: &RunnerSettings,
    run_path: &Path,
    log_dir: &Path,
) -> Result<Vec<Sink>> {
    let plan = sink_plan(mode, descriptor);
    info!(?plan, "setting up reporters");

    plan.into_iter()
        .map(|kind| -> Result<Sink> {
            match kind {
                SinkKind::Interactive => Ok(Sink::Interactive(InteractiveSink::new())),
                SinkKind::File => {
                    let log = ResourceLog::create(log_dir, Local::now())
                        .map_err(|e| ReportingError::io("file", e))?;
                    let sink = FileSink::create(run_path, log)
                        .map_err(|e| ReportingError::io("file", e))?;
                    Ok(Sink::File(sink))
                }
                SinkKind::Event => {
                    let addr = parse_endpoint(descriptor.dispatch_url().unwrap_or_default())?;
                    let token = descriptor.token().map(str::to_string);
                    let sink = EventSink::new(&addr, descriptor.realization(), token)
                        .with_ack_policy(settings.ack_timeout, settings.ack_retries);
                    Ok(Sink::Event(sink))
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawJobsDescriptor;

    fn descriptor(ens: Option<&str>, experiment: Option<&str>, url: Option<&str>) -> JobsDescriptor {
        JobsDescriptor::try_from(RawJobsDescriptor {
            ens_id: ens.map(str::to_string),
            experiment_id: experiment.map(str::to_string),
            dispatch_url: url.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn interactive_mode_only_uses_console() {
        let d = descriptor(Some("e"), None, Some("tcp://h:1"));
        assert_eq!(sink_plan(RunMode::Interactive, &d), vec![SinkKind::Interactive]);
    }

    #[test]
    fn ensemble_runs_add_one_event_sink() {
        let d = descriptor(Some("e"), None, Some("tcp://h:1"));
        assert_eq!(sink_plan(RunMode::Batch, &d), vec![SinkKind::File, SinkKind::Event]);
    }

    #[test]
    fn experiment_or_missing_endpoint_means_file_only() {
        let with_experiment = descriptor(Some("e"), Some("x"), Some("tcp://h:1"));
        let without_url = descriptor(Some("e"), None, None);
        let without_ens = descriptor(None, None, Some("tcp://h:1"));
        for d in [with_experiment, without_url, without_ens] {
            assert_eq!(sink_plan(RunMode::Batch, &d), vec![SinkKind::File]);
        }
    }
}
