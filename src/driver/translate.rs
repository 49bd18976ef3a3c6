// src/driver/translate.rs

//! Turns inbound status messages into scheduler events.
//!
//! Senders retransmit unacked frames, so the same message can arrive more
//! than once. Translation is idempotent per sender run: a sender identity
//! produces at most one `Started` and one `Finished` for a realization. A
//! resubmitted realization connects under a new identity and is tracked
//! afresh.

use std::collections::HashMap;

use crate::message::{Message, MessageKind, ProcessTreeStatus};
use crate::types::Iens;

use super::event::Event;

/// Returncode reported for a failed realization when no step exit code
/// explains the failure.
pub const GENERIC_FAILURE_RETURNCODE: i32 = 1;

/// What the collector knows about one run of a realization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealizationState {
    pub started: bool,
    pub finished: bool,
    /// Last non-zero step exit code.
    pub last_failure: Option<i32>,
    pub steps_exited: usize,
    pub last_status: Option<ProcessTreeStatus>,
}

#[derive(Debug, Default)]
pub struct Translator {
    runs: HashMap<(String, Iens), RealizationState>,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, sender: &str, iens: Iens) -> Option<&RealizationState> {
        self.runs.get(&(sender.to_string(), iens))
    }

    /// Record `message` from `sender` and return the event it produces, if
    /// any.
    pub fn translate(&mut self, sender: &str, message: &Message) -> Option<Event> {
        let iens = message.realization;
        let state = self.runs.entry((sender.to_string(), iens)).or_default();

        match &message.kind {
            MessageKind::Start => {
                if state.started {
                    return None;
                }
                state.started = true;
                Some(Event::Started { iens })
            }
            MessageKind::Running { status } => {
                state.last_status = Some(*status);
                None
            }
            MessageKind::Exited { exit_code, .. } => {
                state.steps_exited += 1;
                if *exit_code != 0 {
                    state.last_failure = Some(*exit_code);
                }
                None
            }
            MessageKind::Finish { success } => {
                if state.finished {
                    return None;
                }
                state.finished = true;
                let returncode = if *success {
                    0
                } else {
                    state.last_failure.unwrap_or(GENERIC_FAILURE_RETURNCODE)
                };
                Some(Event::Finished { iens, returncode })
            }
        }
    }

    /// Forget a sender's runs once it has disconnected.
    pub fn release(&mut self, sender: &str) {
        self.runs.retain(|(identity, _), _| identity != sender);
    }
}
