// src/reporting/interactive.rs

//! Console reporting for manual runs of selected steps.

use std::fmt;
use std::io::{self, Write};

use crate::errors::ReportingError;
use crate::message::{Message, MessageKind};

const SINK: &str = "interactive";

/// Prints a line per step start and exit, and the overall result.
pub struct InteractiveSink {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

impl fmt::Debug for InteractiveSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveSink").finish_non_exhaustive()
    }
}

impl Default for InteractiveSink {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractiveSink {
    pub fn new() -> Self {
        Self::with_writers(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn with_writers(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self { out, err }
    }

    pub fn report(&mut self, message: &Message) -> Result<(), ReportingError> {
        let step = message.step.as_ref().map(|s| s.name.as_str()).unwrap_or("-");
        let res = match &message.kind {
            MessageKind::Start => writeln!(self.out, "Running step: {step} ... "),
            // Resource samples are too chatty for the console.
            MessageKind::Running { .. } => Ok(()),
            MessageKind::Exited { exit_code: 0, .. } => writeln!(self.out, "{step}: OK"),
            MessageKind::Exited { exit_code, error } => {
                writeln!(self.out, "{step}: failed (exit code {exit_code})").and_then(|_| {
                    match error {
                        Some(error) => writeln!(self.err, "  {error}"),
                        None => Ok(()),
                    }
                })
            }
            MessageKind::Finish { success: true } => writeln!(self.out, "All steps completed."),
            MessageKind::Finish { success: false } => {
                writeln!(self.err, "Realization {} failed.", message.realization)
            }
        };
        res.and_then(|_| self.out.flush())
            .map_err(|e| ReportingError::io(SINK, e))
    }

    pub fn stop(&mut self) -> Result<(), ReportingError> {
        self.out
            .flush()
            .and_then(|_| self.err.flush())
            .map_err(|e| ReportingError::io(SINK, e))
    }
}
