// src/reporting/reporter.rs

//! The reporter capability and the closed set of sinks implementing it.

use std::future::Future;
use std::pin::Pin;

use crate::errors::ReportingError;
use crate::message::Message;

use super::event::EventSink;
use super::file::FileSink;
use super::interactive::InteractiveSink;

pub type ReportFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ReportingError>> + Send + 'a>>;

/// Something that receives a realization's status messages.
///
/// Production code uses [`Sink`]; tests can provide their own implementation
/// (for example one that fails on a chosen message).
pub trait Reporter: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this reporter holds a live collector connection that must be
    /// released with [`Reporter::stop`].
    fn is_event_sink(&self) -> bool {
        false
    }

    fn report<'a>(&'a mut self, message: &'a Message) -> ReportFuture<'a>;

    /// Release resources. Must be safe to call more than once.
    fn stop(&mut self) -> ReportFuture<'_>;
}

/// The sinks a realization run can report to.
#[derive(Debug)]
pub enum Sink {
    File(FileSink),
    Interactive(InteractiveSink),
    Event(EventSink),
}

impl Reporter for Sink {
    fn name(&self) -> &str {
        match self {
            Sink::File(_) => "file",
            Sink::Interactive(_) => "interactive",
            Sink::Event(_) => "event",
        }
    }

    fn is_event_sink(&self) -> bool {
        matches!(self, Sink::Event(_))
    }

    fn report<'a>(&'a mut self, message: &'a Message) -> ReportFuture<'a> {
        match self {
            Sink::File(sink) => Box::pin(async move { sink.report(message) }),
            Sink::Interactive(sink) => Box::pin(async move { sink.report(message) }),
            Sink::Event(sink) => Box::pin(sink.report(message)),
        }
    }

    fn stop(&mut self) -> ReportFuture<'_> {
        match self {
            Sink::File(sink) => Box::pin(async move {
                sink.stop();
                Ok(())
            }),
            Sink::Interactive(sink) => Box::pin(async move { sink.stop() }),
            Sink::Event(sink) => Box::pin(sink.stop()),
        }
    }
}
