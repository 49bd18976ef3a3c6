// src/driver/consumer.rs

//! Scheduler-facing helper that waits for a set of realizations.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::errors::DriverError;
use crate::types::Iens;

use super::event::Event;
use super::handle::Driver;

type StartedHook<'a> = Box<dyn FnMut(Iens) + Send + 'a>;
type FinishedHook<'a> = Box<dyn FnMut(Iens, i32) + Send + 'a>;

/// Optional callbacks invoked, in delivery order, while polling.
#[derive(Default)]
pub struct PollHooks<'a> {
    started: Option<StartedHook<'a>>,
    finished: Option<FinishedHook<'a>>,
}

impl<'a> PollHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_started(mut self, hook: impl FnMut(Iens) + Send + 'a) -> Self {
        self.started = Some(Box::new(hook));
        self
    }

    /// Called with the realization index and its returncode.
    pub fn on_finished(mut self, hook: impl FnMut(Iens, i32) + Send + 'a) -> Self {
        self.finished = Some(Box::new(hook));
        self
    }
}

/// Poll `driver` until every realization in `expected` has finished,
/// successfully or not.
///
/// The poll loop is started here and is always cancelled and awaited before
/// returning, whether consumption succeeded or failed.
pub async fn poll(
    driver: &mut Driver,
    expected: &BTreeSet<Iens>,
    hooks: PollHooks<'_>,
) -> Result<(), DriverError> {
    let consumed = match driver.poll() {
        Ok(()) => consume(driver, expected, hooks).await,
        Err(e) => Err(e),
    };
    let settled = driver.finish().await;
    consumed.and(settled.map(|_| ()))
}

async fn consume(
    driver: &mut Driver,
    expected: &BTreeSet<Iens>,
    mut hooks: PollHooks<'_>,
) -> Result<(), DriverError> {
    let mut completed = BTreeSet::new();

    while !expected.is_subset(&completed) {
        let event = driver.next_event().await.ok_or(DriverError::QueueClosed)?;
        debug!(%event, "driver event");

        match event {
            Event::Started { iens } => {
                if let Some(hook) = hooks.started.as_mut() {
                    hook(iens);
                }
            }
            Event::Finished { iens, returncode } => {
                if let Some(hook) = hooks.finished.as_mut() {
                    hook(iens, returncode);
                }
                completed.insert(iens);
            }
        }
    }

    info!(realizations = expected.len(), "all expected realizations finished");
    Ok(())
}
