use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fmrunner::errors::ReportingError;
use fmrunner::message::Message;
use fmrunner::reporting::{ProcessGroupKiller, ReportFuture, Reporter};

/// What a [`RecordingReporter`] saw.
#[derive(Debug, Default)]
pub struct ReporterLog {
    /// Every message handed to `report`, including the failing one.
    pub received: Vec<Message>,
    pub stops: usize,
}

/// A reporter that records its calls and can fail on a chosen call.
pub struct RecordingReporter {
    name: String,
    event_sink: bool,
    fail_at: Option<usize>,
    delay: Option<Duration>,
    log: Arc<Mutex<ReporterLog>>,
}

impl RecordingReporter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            event_sink: false,
            fail_at: None,
            delay: None,
            log: Arc::new(Mutex::new(ReporterLog::default())),
        }
    }

    /// Fail the `index`-th (0-based) call to `report`.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Take `delay` to handle each message, like a sink waiting on acks.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pretend to hold a collector connection.
    pub fn as_event_sink(mut self) -> Self {
        self.event_sink = true;
        self
    }

    /// Shared view of the log, usable after the reporter has been moved.
    pub fn log(&self) -> Arc<Mutex<ReporterLog>> {
        Arc::clone(&self.log)
    }
}

impl Reporter for RecordingReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_event_sink(&self) -> bool {
        self.event_sink
    }

    fn report<'a>(&'a mut self, message: &'a Message) -> ReportFuture<'a> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let call = {
                let mut log = self.log.lock().unwrap();
                log.received.push(message.clone());
                log.received.len() - 1
            };
            if self.fail_at == Some(call) {
                return Err(ReportingError::io(
                    "recording",
                    io::Error::other(format!("{} refuses message {call}", self.name)),
                ));
            }
            Ok(())
        })
    }

    fn stop(&mut self) -> ReportFuture<'_> {
        Box::pin(async move {
            self.log.lock().unwrap().stops += 1;
            Ok(())
        })
    }
}

/// Counts kill requests instead of killing anything.
#[derive(Debug, Default)]
pub struct RecordingKiller {
    kills: AtomicUsize,
}

impl RecordingKiller {
    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl ProcessGroupKiller for RecordingKiller {
    fn kill_process_group(&self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }
}
