// src/reporting/fanout.rs

//! Delivery of the message stream to every active reporter.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::errors::ReportingError;
use crate::message::Message;

use super::reporter::Reporter;
use super::shutdown::{HardShutdown, ProcessGroupKiller, stop_reporters};

/// How the delivery loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// The stream ended normally; reporters were stopped gracefully.
    Completed,
    /// A failed `Finish` triggered the hard shutdown.
    RunFailed,
    /// A termination request triggered the hard shutdown.
    Terminated,
}

/// Deliver every message to every still-active reporter, in list order,
/// before moving on to the next message.
///
/// A reporter that fails is removed for good (an event sink is stopped on
/// the way out so its connection is released) and the others carry on.
/// A failed `Finish` or the `termination` future completing fires the hard
/// shutdown, even while a slow reporter is still busy with a message.
/// Losing every reporter is the only error.
pub async fn report_all_messages<R, K, T>(
    mut messages: mpsc::Receiver<Message>,
    reporters: &mut Vec<R>,
    shutdown: &HardShutdown<K>,
    termination: T,
) -> Result<FanoutOutcome, ReportingError>
where
    R: Reporter,
    K: ProcessGroupKiller,
    T: Future<Output = ()>,
{
    tokio::pin!(termination);

    loop {
        let message = tokio::select! {
            biased;
            _ = &mut termination => {
                warn!("termination requested");
                shutdown.fire(reporters).await;
                return Ok(FanoutOutcome::Terminated);
            }
            message = messages.recv() => message,
        };
        let Some(message) = message else {
            break;
        };

        info!(status = %message, "step status");
        let delivered = tokio::select! {
            biased;
            _ = &mut termination => false,
            _ = deliver(&message, reporters) => true,
        };
        if !delivered {
            warn!("termination requested while delivering");
            shutdown.fire(reporters).await;
            return Ok(FanoutOutcome::Terminated);
        }

        if message.finish_success() == Some(false) {
            shutdown.fire(reporters).await;
            return Ok(FanoutOutcome::RunFailed);
        }

        if reporters.is_empty() {
            error!("all reporters have failed");
            return Err(ReportingError::AllReportersFailed);
        }
    }

    stop_reporters(reporters).await;
    Ok(FanoutOutcome::Completed)
}

/// Hand one message to each reporter, dropping the ones that fail.
pub async fn deliver<R: Reporter>(message: &Message, reporters: &mut Vec<R>) {
    let mut i = 0;
    while i < reporters.len() {
        match reporters[i].report(message).await {
            Ok(()) => i += 1,
            Err(err) => {
                let mut reporter = reporters.remove(i);
                error!(
                    reporter = reporter.name(),
                    error = %err,
                    "reporter failed; removing it"
                );
                if reporter.is_event_sink() {
                    if let Err(e) = reporter.stop().await {
                        warn!(reporter = reporter.name(), error = %e, "failed reporter did not stop cleanly");
                    }
                }
            }
        }
    }
}
